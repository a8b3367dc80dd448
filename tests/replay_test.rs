#![allow(clippy::expect_used)]

use colloquy::ProcessorConfig;
use colloquy::replay::{Recording, Transcript, replay};

fn config(response_timeout_ms: u64) -> ProcessorConfig {
    ProcessorConfig {
        response_timeout_ms,
        ..ProcessorConfig::default()
    }
}

async fn run(text: &str, config: &ProcessorConfig) -> Transcript {
    let recording = Recording::parse(text).expect("recording should parse");
    replay(&recording, config).await
}

#[tokio::test(start_paused = true)]
async fn out_of_order_chunks_reassemble() {
    let transcript = run(
        include_str!("cases/out_of_order.session"),
        &ProcessorConfig::default(),
    )
    .await;
    insta::assert_snapshot!(transcript.to_string(), @r#"
    states:
      idle
      processing "how far is it"
      responding c1@abc
      idle
    timeouts: 0
    history:
      input: how far is it
      response c1@abc (finished, 1 events): foo bar baz
    "#);
}

#[tokio::test(start_paused = true)]
async fn supplements_follow_active_conversation_in_prefix_order() {
    let transcript = run(
        include_str!("cases/supplements.session"),
        &ProcessorConfig::default(),
    )
    .await;
    insta::assert_snapshot!(transcript.to_string(), @r#"
    states:
      idle
      processing "hi"
      responding c@r1
      responding s1@2024-01-01
      responding s2@2024-01-02
      idle
    timeouts: 0
    history:
      input: hi
      response c@r1 (finished, 0 events): Hello there
      response s1@2024-01-01 (finished, 0 events): First update
      response s2@2024-01-02 (finished, 0 events): Second
    "#);
}

#[tokio::test(start_paused = true)]
async fn stalled_response_times_out() {
    let transcript = run(include_str!("cases/timeout.session"), &config(1_000)).await;
    assert_eq!(transcript.timeouts.len(), 1);
    insta::assert_snapshot!(transcript.to_string(), @r#"
    states:
      idle
      processing "navigate home"
      responding c@r1
      idle
    timeouts: 1
    history:
      input: navigate home
      response c@r1 (interrupted, 0 events): Starting
    "#);
}

#[tokio::test(start_paused = true)]
async fn new_input_interrupts_and_no_response_is_recorded() {
    let transcript = run(
        include_str!("cases/interrupts.session"),
        &ProcessorConfig::default(),
    )
    .await;
    insta::assert_snapshot!(transcript.to_string(), @r#"
    states:
      idle
      processing "turn up the volume"
      no-response q
      idle
      idle
      processing "go home"
      responding c@r2
      idle
      processing "stop"
    timeouts: 0
    history:
      input: turn up the volume
      no-response q: 1 events
      input: go home
      response c@r2 (interrupted, 0 events): Routing
      input: stop
    "#);
}

#[tokio::test(start_paused = true)]
async fn clear_forgets_history() {
    let text = r#"
> hi
< {"id":1,"timestamp":1,"chunk_id":"r1@0","type":"conversation","data":{"conversation_id":"c","content":"Hello","initial":true,"final":true}}
!!
> again
"#;
    let transcript = run(text, &ProcessorConfig::default()).await;
    insta::assert_snapshot!(transcript.to_string(), @r#"
    states:
      idle
      processing "hi"
      responding c@r1
      idle
      idle
      idle
      processing "again"
    timeouts: 0
    history:
      input: again
    "#);
}

#[tokio::test(start_paused = true)]
async fn activity_within_window_never_times_out() {
    let text = r#"
> story
< {"id":1,"timestamp":1,"chunk_id":"r@0","type":"conversation","data":{"conversation_id":"c","content":"Once","initial":true}}
~ 800
< {"id":2,"timestamp":2,"chunk_id":"r@1","type":"conversation","data":{"conversation_id":"c","content":"upon"}}
~ 800
< {"id":3,"timestamp":3,"chunk_id":"r@2","type":"conversation","data":{"conversation_id":"c","content":"a time","final":true}}
"#;
    let transcript = run(text, &config(1_000)).await;
    assert!(transcript.timeouts.is_empty());
    let response = transcript
        .history
        .iter()
        .find_map(|element| element.as_response())
        .expect("response recorded");
    assert_eq!(response.text(), "Once upon a time");
    assert!(!response.was_interrupted());
}
