//! End-to-end turn scenarios
//!
//! Each test wires the orchestrator to scripted speech collaborators, a
//! scripted provider and a manual clock, then checks what was generated,
//! remembered and spoken.

use parley_engine::clock::ManualClock;
use parley_engine::conversation::{ConversationMemory, TurnOrchestrator, TurnOutcome, TurnSettings};
use parley_engine::llm::mock::ScriptedProvider;
use parley_engine::llm::retry::{GenerationRetrier, RetryPolicy};
use parley_engine::llm::LLMError;
use parley_engine::rate_limiter::RateLimiter;
use parley_engine::sanitizer::Sanitizer;
use parley_engine::speech::{RecordingSynthesizer, ScriptedTranscriber};
use sdk::types::{ListenOutcome, SpeechFailure};
use std::sync::Arc;
use std::time::Duration;

const APOLOGY: &str = "I'm having trouble connecting right now. Please try again later.";
const SLOW_DOWN: &str = "I'm getting a lot of requests right now. Please try again later.";

struct Harness {
    orchestrator: TurnOrchestrator,
    provider: Arc<ScriptedProvider>,
    synthesizer: RecordingSynthesizer,
    clock: ManualClock,
}

fn harness_with(
    transcriber: ScriptedTranscriber,
    provider: ScriptedProvider,
    synthesizer: RecordingSynthesizer,
    capacity: u32,
) -> Harness {
    let clock = ManualClock::new();
    let provider = Arc::new(provider);

    let retrier = GenerationRetrier::new(
        Arc::clone(&provider) as Arc<dyn parley_engine::llm::LLMProvider>,
        RetryPolicy::new(3, Duration::from_secs(2)),
        Arc::new(clock.clone()),
        APOLOGY,
    );
    let limiter = RateLimiter::with_clock(
        capacity,
        Duration::from_secs(60),
        Duration::from_secs(5),
        Arc::new(clock.clone()),
    );

    let orchestrator = TurnOrchestrator::new(
        Box::new(transcriber),
        Box::new(synthesizer.clone()),
        Sanitizer::new().unwrap(),
        limiter,
        ConversationMemory::new(),
        retrier,
    )
    .unwrap()
    .with_settings(TurnSettings::new(vec!["exit".to_string()], SLOW_DOWN))
    .with_sleeper(Arc::new(clock.clone()));

    Harness {
        orchestrator,
        provider,
        synthesizer,
        clock,
    }
}

fn harness(transcriber: ScriptedTranscriber, provider: ScriptedProvider) -> Harness {
    harness_with(transcriber, provider, RecordingSynthesizer::new(), 30)
}

#[tokio::test]
async fn test_hello_turn_records_and_speaks_stripped_reply() {
    let mut h = harness(
        ScriptedTranscriber::hearing(["hello"]),
        ScriptedProvider::replying("AI: Hi there!", 1),
    );

    let outcome = h.orchestrator.step().await;

    assert_eq!(
        outcome,
        TurnOutcome::Replied {
            spoken: "Hi there!".to_string()
        }
    );
    assert_eq!(h.orchestrator.memory().lines(), vec!["You: hello", "AI: Hi there!"]);
    assert_eq!(h.synthesizer.spoken(), vec!["Hi there!"]);
    assert_eq!(h.orchestrator.limiter().state().request_count, 1);
}

#[tokio::test]
async fn test_exit_phrase_terminates_without_calls() {
    let mut h = harness(
        ScriptedTranscriber::hearing(["please exit now"]),
        ScriptedProvider::replying("unused", 1),
    );

    let outcome = h.orchestrator.step().await;

    assert_eq!(outcome, TurnOutcome::Terminated);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.synthesizer.calls(), 0);
    assert_eq!(h.orchestrator.limiter().state().request_count, 0);
}

#[tokio::test]
async fn test_exit_is_case_insensitive() {
    let mut h = harness(
        ScriptedTranscriber::hearing(["OK, EXIT."]),
        ScriptedProvider::default(),
    );

    assert_eq!(h.orchestrator.step().await, TurnOutcome::Terminated);
}

#[tokio::test]
async fn test_silence_makes_no_calls() {
    let mut h = harness(
        ScriptedTranscriber::new([
            ListenOutcome::Heard(String::new()),
            ListenOutcome::Silence,
            ListenOutcome::Failed(SpeechFailure::Unintelligible),
            ListenOutcome::Failed(SpeechFailure::Service("quota".to_string())),
        ]),
        ScriptedProvider::replying("unused", 1),
    );

    for _ in 0..4 {
        assert_eq!(h.orchestrator.step().await, TurnOutcome::NoInput);
    }

    assert_eq!(h.orchestrator.limiter().state().request_count, 0);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.synthesizer.calls(), 0);
    assert!(h.orchestrator.memory().is_empty());
}

#[tokio::test]
async fn test_rejected_input_is_dropped() {
    let too_long = "a".repeat(501);
    let mut h = harness(
        ScriptedTranscriber::hearing(["<script>", too_long.as_str()]),
        ScriptedProvider::replying("unused", 1),
    );

    assert_eq!(h.orchestrator.step().await, TurnOutcome::Rejected);
    assert_eq!(h.orchestrator.step().await, TurnOutcome::Rejected);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.synthesizer.calls(), 0);
}

#[tokio::test]
async fn test_rate_limited_turn_speaks_slow_down_and_pauses() {
    let mut h = harness_with(
        ScriptedTranscriber::hearing(["one", "two", "three"]),
        ScriptedProvider::replying("fine", 3),
        RecordingSynthesizer::new(),
        2,
    );

    h.orchestrator.step().await;
    h.orchestrator.step().await;
    let outcome = h.orchestrator.step().await;

    assert_eq!(outcome, TurnOutcome::RateLimited);
    assert_eq!(h.provider.calls(), 2);
    assert_eq!(h.synthesizer.spoken(), vec!["fine", "fine", SLOW_DOWN]);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(5)]);
    assert_eq!(h.orchestrator.memory().len(), 4);
}

#[tokio::test]
async fn test_window_reset_allows_generation_again() {
    let mut h = harness_with(
        ScriptedTranscriber::hearing(["one", "two", "three"]),
        ScriptedProvider::replying("fine", 3),
        RecordingSynthesizer::new(),
        1,
    );

    h.orchestrator.step().await;
    assert_eq!(h.orchestrator.step().await, TurnOutcome::RateLimited);

    // The 5 s cooldown already moved the clock; go past the 60 s window
    h.clock.advance(Duration::from_secs(56));
    assert!(matches!(
        h.orchestrator.step().await,
        TurnOutcome::Replied { .. }
    ));
}

#[tokio::test]
async fn test_transient_errors_retried_then_reply() {
    let mut h = harness(
        ScriptedTranscriber::hearing(["hello"]),
        ScriptedProvider::new([
            Err(LLMError::RateLimitExceeded),
            Err(LLMError::RateLimitExceeded),
            Ok("**Hello** again".to_string()),
        ]),
    );

    let outcome = h.orchestrator.step().await;

    assert_eq!(
        outcome,
        TurnOutcome::Replied {
            spoken: "Hello again".to_string()
        }
    );
    assert_eq!(h.provider.calls(), 3);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2); 2]);
    // Rate limiter is consulted once per turn, not per attempt
    assert_eq!(h.orchestrator.limiter().state().request_count, 1);
}

#[tokio::test]
async fn test_exhaustion_speaks_apology_and_keeps_memory() {
    let mut h = harness(
        ScriptedTranscriber::hearing(["hello", "still there?"]),
        ScriptedProvider::new([
            Ok("Hi!".to_string()),
            Err(LLMError::RateLimitExceeded),
            Err(LLMError::RateLimitExceeded),
            Err(LLMError::RateLimitExceeded),
        ]),
    );

    h.orchestrator.step().await;
    let outcome = h.orchestrator.step().await;

    assert_eq!(
        outcome,
        TurnOutcome::Degraded {
            spoken: APOLOGY.to_string()
        }
    );
    assert_eq!(h.orchestrator.memory().lines(), vec!["You: hello", "AI: Hi!"]);
    assert_eq!(h.synthesizer.spoken(), vec!["Hi!", APOLOGY]);
}

#[tokio::test]
async fn test_terminal_error_apologises_after_one_attempt() {
    let mut h = harness(
        ScriptedTranscriber::hearing(["hello"]),
        ScriptedProvider::new([Err(LLMError::AuthenticationFailed("bad key".to_string()))]),
    );

    let outcome = h.orchestrator.step().await;

    assert_eq!(
        outcome,
        TurnOutcome::Degraded {
            spoken: APOLOGY.to_string()
        }
    );
    assert_eq!(h.provider.calls(), 1);
    assert!(h.clock.sleeps().is_empty());
    assert!(h.orchestrator.memory().is_empty());
}

#[tokio::test]
async fn test_speech_failure_does_not_stop_the_loop() {
    let mut h = harness_with(
        ScriptedTranscriber::hearing(["hello", "again"]),
        ScriptedProvider::replying("Hi.", 2),
        RecordingSynthesizer::failing(),
        30,
    );

    let stats = h.orchestrator.run().await;

    assert_eq!(stats.replies, 2);
    assert_eq!(stats.speech_failures, 2);
    // Memory is still updated when speaking fails
    assert_eq!(h.orchestrator.memory().len(), 4);
}

#[tokio::test]
async fn test_prompt_carries_history() {
    let mut h = harness(
        ScriptedTranscriber::hearing(["my name is Sam", "what is my name"]),
        ScriptedProvider::new([Ok("Nice to meet you.".to_string()), Ok("Sam.".to_string())]),
    );

    h.orchestrator.step().await;
    h.orchestrator.step().await;

    assert_eq!(
        h.provider.prompts()[1],
        "You: my name is Sam\nAI: Nice to meet you.\nYou: what is my name"
    );
}

#[tokio::test]
async fn test_run_until_exit_keyword() {
    let mut h = harness(
        ScriptedTranscriber::new([
            ListenOutcome::Heard("hi".to_string()),
            ListenOutcome::Silence,
            ListenOutcome::Heard("tell me a joke".to_string()),
            ListenOutcome::Heard("exit".to_string()),
            ListenOutcome::Heard("never reached".to_string()),
        ]),
        ScriptedProvider::new([Ok("Hello!".to_string()), Ok("A joke.".to_string())]),
    );

    let stats = h.orchestrator.run().await;

    assert_eq!(stats.turns, 4);
    assert_eq!(stats.replies, 2);
    assert_eq!(stats.ignored, 1);
    assert_eq!(h.synthesizer.spoken(), vec!["Hello!", "A joke."]);
}
