use std::time::Duration;

use hostkit::formatter::{FormatterEvent, RecordingFormatter};
use hostkit::prompt::{PromptResponder, automate};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const PREFIX: &str = "test-host (10.0.0.9:22) :";

const RECORDED_LOGIN: &str = r#"{"ts_ms":1,"event":{"kind":"header","command":"sudo -k true"}}
{"ts_ms":2,"event":{"kind":"normal_line","prefix":"test-host (10.0.0.9:22) :","line":"[sudo] password for ops: "}}
{"ts_ms":3,"event":{"kind":"normal_line","prefix":"test-host (10.0.0.9:22) :","line":"done"}}
{"ts_ms":4,"event":{"kind":"footer","duration_ms":12}}
"#;

#[tokio::test]
async fn prompt_without_newline_is_answered_immediately() {
    let responder = PromptResponder::new([("login: $", "admin")]).expect("compile");
    let recorder = RecordingFormatter::new();
    let (mut remote_out, output) = tokio::io::duplex(1024);
    let (input, mut remote_in) = tokio::io::duplex(1024);

    let automation = tokio::spawn({
        let recorder = recorder.clone();
        async move { automate(output, input, &responder, &recorder, PREFIX).await }
    });

    remote_out.write_all(b"login: ").await.expect("write prompt");
    let mut reply = [0u8; 6];
    tokio::time::timeout(Duration::from_secs(5), remote_in.read_exact(&mut reply))
        .await
        .expect("reply arrives before any newline")
        .expect("read reply");
    assert_eq!(&reply, b"admin\n");

    remote_out.write_all(b"\r\nwelcome\r\n").await.expect("write");
    drop(remote_out);
    automation
        .await
        .expect("automation task")
        .expect("automation");

    assert_eq!(recorder.normal_lines(), vec!["login: ", "welcome"]);
}

#[tokio::test]
async fn each_prompt_gets_exactly_one_reply() {
    let responder = PromptResponder::new([("(?i)password: ?$", "s3cret"), ("\\[y/N\\] ?$", "y")])
        .expect("compile");
    let recorder = RecordingFormatter::new();
    let output: &[u8] = b"Password: \nContinue? [y/N] \nPassword: \n";
    let mut input = Vec::new();

    automate(output, &mut input, &responder, &recorder, PREFIX)
        .await
        .expect("automation");

    assert_eq!(input, b"s3cret\ny\ns3cret\n");
    assert_eq!(recorder.normal_lines().len(), 3);
}

#[tokio::test]
async fn unanswered_output_passes_through_line_by_line() {
    let responder = PromptResponder::empty();
    let recorder = RecordingFormatter::new();
    let output: &[u8] = b"\x1b[32mok\x1b[0m\r\nno newline at end";
    let mut input = Vec::new();

    automate(output, &mut input, &responder, &recorder, PREFIX)
        .await
        .expect("automation");

    assert!(input.is_empty());
    assert_eq!(recorder.normal_lines(), vec!["ok", "no newline at end"]);
}

#[test]
fn recorded_session_loads_from_jsonl() {
    let recorder = RecordingFormatter::from_jsonl(RECORDED_LOGIN).expect("load fixture");
    let events = recorder.events();

    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], FormatterEvent::Header { ref command } if command == "sudo -k true"));
    assert_eq!(
        recorder.normal_lines(),
        vec!["[sudo] password for ops: ", "done"]
    );
    assert!(matches!(
        events[3],
        FormatterEvent::Footer {
            duration_ms: 12,
            error: None
        }
    ));

    let exported = recorder.to_jsonl().expect("export");
    let reloaded = RecordingFormatter::from_jsonl(&exported).expect("reload");
    assert_eq!(reloaded.events().len(), 4);
}
