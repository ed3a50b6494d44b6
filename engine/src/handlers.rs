//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - voice: Run the conversation loop on the microphone and speaker
//! - chat: Run the conversation loop in the terminal
//! - ask: One turn, reply printed
//! - doctor: Validate configuration and check dependencies
//! - forget-key: Remove the stored API key from the keychain

use anyhow::{Context, Result};
use sdk::errors::EngineError;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::audio::{self, CaptureSettings, Microphone, Speaker};
use crate::config::Config;
use crate::conversation::{SessionStats, TurnOrchestrator, TurnOutcome};
use crate::llm::gemini::GeminiProvider;
use crate::llm::LLMProvider;
use crate::secrets::{SecretManager, SecretString, GOOGLE_API_KEY};
use crate::speech::{
    ConsoleSynthesizer, ConsoleTranscriber, GoogleSpeech, RecordingSynthesizer,
    ScriptedTranscriber, VoiceSynthesizer, VoiceTranscriber,
};

/// Keychain service name
const SERVICE_NAME: &str = "parley";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Resolve the Google API key, prompting once if it is stored nowhere
fn resolve_api_key() -> Result<SecretString> {
    let key = SecretManager::new(SERVICE_NAME)
        .get_secret(GOOGLE_API_KEY)
        .context("Failed to load the Google API key")?;
    Ok(key)
}

/// Create the configured generation provider
pub fn build_provider(config: &Config, api_key: SecretString) -> Result<Arc<dyn LLMProvider>> {
    match config.llm.provider.as_str() {
        "gemini" => {
            let provider = GeminiProvider::new(config.llm.gemini.clone(), api_key)
                .context("Failed to create Gemini client")?;
            Ok(Arc::new(provider))
        }
        other => Err(EngineError::Config(format!("Unknown provider '{}'", other)).into()),
    }
}

fn exit_phrase(config: &Config) -> String {
    config
        .conversation
        .exit_keywords
        .iter()
        .find(|k| !k.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| "exit".to_string())
}

fn print_stats(stats: &SessionStats, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!("Goodbye! ({} turns, {} replies)", stats.turns, stats.replies);
        }
        OutputFormat::Json => {
            let output = json!({
                "turns": stats.turns,
                "replies": stats.replies,
                "degraded": stats.degraded,
                "rate_limited": stats.rate_limited,
                "ignored": stats.ignored,
                "speech_failures": stats.speech_failures,
            });
            println!("{}", output);
        }
    }
}

/// Run the voice conversation loop
pub async fn handle_voice(config: &Config, format: OutputFormat) -> Result<()> {
    if audio::input_device_name().is_none() {
        return Err(EngineError::AudioDevice("No input device available".to_string()).into());
    }
    if audio::output_device_name().is_none() {
        return Err(EngineError::AudioDevice("No output device available".to_string()).into());
    }

    let api_key = resolve_api_key()?;
    let provider = build_provider(config, api_key.clone())?;
    let speech = Arc::new(
        GoogleSpeech::new(config.speech.clone(), api_key)
            .context("Failed to create speech client")?,
    );

    let transcriber = VoiceTranscriber::new(
        Microphone::new(CaptureSettings::from(&config.speech)),
        Arc::clone(&speech),
    );
    let synthesizer = VoiceSynthesizer::new(speech, Speaker);

    let mut orchestrator = TurnOrchestrator::from_config(
        config,
        Box::new(transcriber),
        Box::new(synthesizer),
        provider,
    )?;

    if let OutputFormat::Text = format {
        println!("Say something. Say \"{}\" to stop.", exit_phrase(config));
    }

    let stats = orchestrator.run().await;
    print_stats(&stats, format);
    Ok(())
}

/// Run the conversation loop in the terminal
pub async fn handle_chat(config: &Config, format: OutputFormat) -> Result<()> {
    let api_key = resolve_api_key()?;
    let provider = build_provider(config, api_key)?;

    let transcriber = ConsoleTranscriber::stdin(
        format!("{}: ", config.memory.user_label),
        exit_phrase(config),
    );
    let synthesizer = ConsoleSynthesizer::stdout(format!("{}: ", config.memory.assistant_label));

    let mut orchestrator = TurnOrchestrator::from_config(
        config,
        Box::new(transcriber),
        Box::new(synthesizer),
        provider,
    )?;

    if let OutputFormat::Text = format {
        eprintln!("Type a message. Type \"{}\" to stop.", exit_phrase(config));
    }

    let stats = orchestrator.run().await;
    print_stats(&stats, format);
    Ok(())
}

/// Run one turn for `text` and print the reply
pub async fn handle_ask(text: String, config: &Config, format: OutputFormat) -> Result<()> {
    let api_key = resolve_api_key()?;
    let provider = build_provider(config, api_key)?;
    let synthesizer = RecordingSynthesizer::new();

    let mut orchestrator = TurnOrchestrator::from_config(
        config,
        Box::new(ScriptedTranscriber::new([])),
        Box::new(synthesizer.clone()),
        provider,
    )?;

    let outcome = orchestrator.handle_utterance(&text).await;
    let (status, reply) = match &outcome {
        TurnOutcome::Replied { spoken } => ("replied", Some(spoken.as_str())),
        TurnOutcome::Degraded { spoken } => ("degraded", Some(spoken.as_str())),
        TurnOutcome::RateLimited => ("rate_limited", None),
        TurnOutcome::Rejected => ("rejected", None),
        TurnOutcome::NoInput => ("no_input", None),
        TurnOutcome::Terminated => ("terminated", None),
    };

    match format {
        OutputFormat::Text => match reply {
            Some(reply) => println!("{}", reply),
            None => match &outcome {
                TurnOutcome::Rejected => {
                    anyhow::bail!("Input rejected: it is too long or contains ; -- < > or `")
                }
                TurnOutcome::NoInput => anyhow::bail!("Nothing to ask"),
                _ => {
                    for line in synthesizer.spoken() {
                        println!("{}", line);
                    }
                }
            },
        },
        OutputFormat::Json => {
            let output = json!({
                "status": status,
                "reply": reply,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Validate configuration and check dependencies
pub async fn handle_doctor(
    config: &Config,
    config_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    // Check 1: Configuration validation
    // Config is already validated when loaded
    checks.push(("Configuration", format!("Valid ({})", config_path.display())));

    // Check 2: API key, never prompting here
    let manager = SecretManager::new(SERVICE_NAME);
    match manager.require_secret(GOOGLE_API_KEY) {
        Ok(api_key) => {
            checks.push(("Google API key", "Configured".to_string()));

            // Check 3: Provider reachability
            match build_provider(config, api_key) {
                Ok(provider) => {
                    let name = provider.name().to_string();
                    if provider.check_health().await {
                        checks.push(("Generation provider", format!("{} reachable", name)));
                    } else {
                        checks.push(("Generation provider", format!("{} unreachable", name)));
                        issues.push(format!(
                            "Cannot reach {} with model '{}'. Check the key and network.",
                            name,
                            config.llm.gemini.model
                        ));
                    }
                }
                Err(e) => {
                    checks.push(("Generation provider", "Error".to_string()));
                    issues.push(format!("Cannot create provider: {}", e));
                }
            }
        }
        Err(_) => {
            checks.push(("Google API key", "Not configured".to_string()));
            issues.push(format!(
                "No Google API key. Set {} or run 'parley chat' to be prompted.",
                SecretManager::env_names(GOOGLE_API_KEY)[0]
            ));
        }
    }

    // Check 4: Audio devices
    match audio::input_device_name() {
        Some(name) => checks.push(("Microphone", name)),
        None => {
            checks.push(("Microphone", "Not found".to_string()));
            issues.push("No input device. 'parley voice' needs a microphone.".to_string());
        }
    }
    match audio::output_device_name() {
        Some(name) => checks.push(("Speaker", name)),
        None => {
            checks.push(("Speaker", "Not found".to_string()));
            issues.push("No output device. 'parley voice' needs a speaker.".to_string());
        }
    }

    // Output results
    match format {
        OutputFormat::Text => {
            println!("Parley System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({"name": name, "status": status})
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Remove the Google API key from the keychain
///
/// Keys supplied through the environment are not touched.
pub fn handle_forget_key(format: OutputFormat) -> Result<()> {
    SecretManager::new(SERVICE_NAME)
        .delete_secret(GOOGLE_API_KEY)
        .context("Failed to remove the Google API key")?;

    match format {
        OutputFormat::Text => println!("Removed the Google API key from the keychain"),
        OutputFormat::Json => {
            let output = json!({"status": "removed", "key": GOOGLE_API_KEY});
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
