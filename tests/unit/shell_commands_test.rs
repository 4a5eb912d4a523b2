// Tests for src/shell/commands/
//
// Tests cover:
// - Output and exit status of every registered command
// - The virtual shell loop: prompts, last status, exit, nested su shells
// - Working directory confinement for cd
// - Unknown commands

use sshtrap::shell::commands::{lookup, names};
use sshtrap::shell::error::ExecError;
use sshtrap::shell::filesystem::JAIL_ROOT;
use sshtrap::test_utils::{CommandHarness, ScriptedInput};

fn no_input() -> ScriptedInput {
    ScriptedInput::new(Vec::<String>::new())
}

// ---------------------------------------------------------------------------
// Simple commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_echo_joins_arguments() {
    let mut h = CommandHarness::new();
    let outcome = h.run(&["echo", "hello", "world"], &mut no_input()).await;
    assert_eq!(outcome.status, 0);
    assert_eq!(h.stdout.contents(), "hello world\n");
}

#[tokio::test]
async fn test_echo_without_arguments_prints_newline() {
    let mut h = CommandHarness::new();
    h.run(&["echo"], &mut no_input()).await;
    assert_eq!(h.stdout.contents(), "\n");
}

#[tokio::test]
async fn test_true_and_false() {
    let mut h = CommandHarness::new();
    assert_eq!(h.run(&["true"], &mut no_input()).await.status, 0);
    assert_eq!(h.run(&["false"], &mut no_input()).await.status, 1);
    assert!(h.stdout.contents().is_empty());
}

#[tokio::test]
async fn test_hostname_and_id() {
    let mut h = CommandHarness::new();
    h.run(&["hostname"], &mut no_input()).await;
    h.run(&["id"], &mut no_input()).await;
    assert_eq!(
        h.stdout.contents(),
        "testhost\nuid=0(root) gid=0(root) groups=0(root)\n"
    );
}

#[tokio::test]
async fn test_uname_variants() {
    let mut h = CommandHarness::new();
    h.run(&["uname", "-r"], &mut no_input()).await;
    h.run(&["uname", "-n", "-s"], &mut no_input()).await;
    assert_eq!(h.stdout.contents(), "5.15.0-101-generic\nLinux testhost\n");
}

#[tokio::test]
async fn test_cat_copies_stdin() {
    let mut h = CommandHarness::new();
    let mut input = ScriptedInput::new(["first", "second"]);
    let outcome = h.run(&["cat"], &mut input).await;
    assert_eq!(outcome.status, 0);
    assert_eq!(outcome.error, None);
    assert_eq!(h.stdout.contents(), "first\nsecond\n");
}

#[tokio::test]
async fn test_cat_stops_on_client_hangup() {
    let mut h = CommandHarness::new();
    let mut input = ScriptedInput::new(["only"]).ending_with(ExecError::ClientEof);
    let outcome = h.run(&["cat"], &mut input).await;
    assert_eq!(outcome.status, 0);
    assert_eq!(h.stdout.contents(), "only\n");
}

#[tokio::test]
async fn test_cat_refuses_files() {
    let mut h = CommandHarness::new();
    let outcome = h.run(&["cat", "/etc/passwd"], &mut no_input()).await;
    assert_eq!(outcome.status, 1);
    assert_eq!(
        h.stderr.contents(),
        "testhost: cat: file operations are not implemented\n"
    );
}

#[tokio::test]
async fn test_unknown_command() {
    let mut h = CommandHarness::new();
    let outcome = h.run(&["busybox", "wget"], &mut no_input()).await;
    assert_eq!(outcome.status, 127);
    assert_eq!(h.stderr.contents(), "testhost: busybox: command not found\n");
}

#[test]
fn test_registry_names_resolve() {
    for name in names() {
        assert!(lookup(name).is_some(), "{name} not resolvable");
    }
    assert!(lookup("rm").is_none());
}

// ---------------------------------------------------------------------------
// cd / pwd
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cd_within_jail_updates_cwd() {
    let mut h = CommandHarness::new();
    assert_eq!(h.run(&["cd", "projects/./src"], &mut no_input()).await.status, 0);
    assert_eq!(h.cwd, "/home/guest/projects/src");

    h.run(&["pwd"], &mut no_input()).await;
    assert_eq!(h.stdout.contents(), "/home/guest/projects/src\n");

    assert_eq!(h.run(&["cd"], &mut no_input()).await.status, 0);
    assert_eq!(h.cwd, JAIL_ROOT);
}

#[tokio::test]
async fn test_cd_outside_jail_denied() {
    let mut h = CommandHarness::new();
    let outcome = h.run(&["cd", "/etc"], &mut no_input()).await;
    assert_eq!(outcome.status, 1);
    assert_eq!(h.cwd, JAIL_ROOT);
    assert_eq!(h.stderr.contents(), "testhost: cd: /etc: Permission denied\n");

    h.run(&["cd", ".."], &mut no_input()).await;
    assert_eq!(h.cwd, JAIL_ROOT);
}

#[tokio::test]
async fn test_cd_prefix_sibling_is_outside() {
    let mut h = CommandHarness::new();
    let outcome = h.run(&["cd", "/home/guest2"], &mut no_input()).await;
    assert_eq!(outcome.status, 1);
    assert_eq!(h.cwd, JAIL_ROOT);
}

// ---------------------------------------------------------------------------
// exit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_exit_statuses() {
    let mut h = CommandHarness::new();
    assert_eq!(h.run(&["exit"], &mut no_input()).await.status, 0);
    assert_eq!(h.run(&["exit", "42"], &mut no_input()).await.status, 42);
    assert_eq!(h.run(&["exit", "4294967297"], &mut no_input()).await.status, 1);
}

#[tokio::test]
async fn test_exit_non_numeric() {
    let mut h = CommandHarness::new();
    let outcome = h.run(&["exit", "soon"], &mut no_input()).await;
    assert_eq!(outcome.status, 255);
    assert_eq!(
        h.stderr.contents(),
        "testhost: exit: soon: numeric argument required\n"
    );
}

// ---------------------------------------------------------------------------
// wpm / apt / system info
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_wpm_subcommands_all_fail() {
    let cases: &[(&[&str], &str)] = &[
        (&["wpm", "list"], "E: Package lists are missing. Run 'wpm update' first.\n"),
        (
            &["wpm", "install", "nginx"],
            "E: Unable to locate package 'nginx'. Run 'wpm update' first.\n",
        ),
        (&["wpm", "install"], "Usage: wpm install <package>\n"),
        (
            &["wpm", "remove", "libc6"],
            "E: Package 'libc6' is an essential system component and cannot be removed.\n",
        ),
        (&["wpm", "frobnicate"], "testhost: wpm: unknown command 'frobnicate'\n"),
    ];
    for (args, expected) in cases {
        let mut h = CommandHarness::new();
        let outcome = h.run(args, &mut no_input()).await;
        assert_eq!(outcome.status, 1, "{args:?}");
        assert_eq!(h.stderr.contents(), *expected, "{args:?}");
        assert!(h.stdout.contents().is_empty());
    }
}

#[tokio::test]
async fn test_apt_points_at_wpm() {
    for name in ["apt", "apt-get"] {
        let mut h = CommandHarness::new();
        let outcome = h.run(&[name, "install", "curl"], &mut no_input()).await;
        assert_eq!(outcome.status, 1);
        assert_eq!(
            h.stderr.contents(),
            "Note: use 'wpm' for package management on this system.\n"
        );
    }
}

#[tokio::test]
async fn test_lscpu_free_lspci() {
    let mut h = CommandHarness::new();
    assert_eq!(h.run(&["lscpu"], &mut no_input()).await.status, 0);
    assert!(h.stdout.contents().starts_with("Architecture:        x86_64\n"));

    let mut h = CommandHarness::new();
    assert_eq!(h.run(&["free"], &mut no_input()).await.status, 0);
    let out = h.stdout.contents();
    assert_eq!(out.lines().count(), 3);
    assert!(out.lines().nth(1).unwrap().starts_with("Mem:"));
    assert!(out.contains("524288"));

    let mut h = CommandHarness::new();
    assert_eq!(h.run(&["lspci"], &mut no_input()).await.status, 1);
    assert_eq!(
        h.stderr.contents(),
        "lspci: Cannot open /sys/bus/pci/devices: Permission denied\n"
    );
}

// ---------------------------------------------------------------------------
// sh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_shell_runs_lines_and_returns_last_status() {
    let mut h = CommandHarness::new();
    let mut input = ScriptedInput::new(["echo one", "", "   ", "false"]);
    let outcome = h.run(&["sh"], &mut input).await;
    assert_eq!(outcome.status, 1);
    assert_eq!(outcome.error, None);
    assert_eq!(h.stdout.contents(), "one\n");
}

#[tokio::test]
async fn test_shell_exit_stops_reading() {
    let mut h = CommandHarness::new();
    let mut input = ScriptedInput::new(["exit 9", "echo unreachable"]);
    let outcome = h.run(&["sh"], &mut input).await;
    assert_eq!(outcome.status, 9);
    assert!(h.stdout.contents().is_empty());
}

#[tokio::test]
async fn test_shell_keeps_its_own_cwd() {
    let mut h = CommandHarness::new();
    let mut input = ScriptedInput::new(["cd docs", "pwd", "cd /", "pwd"]);
    let outcome = h.run(&["sh"], &mut input).await;
    assert_eq!(outcome.status, 0);
    assert_eq!(h.stdout.contents(), "/home/guest/docs\n/home/guest/docs\n");
    assert_eq!(h.stderr.contents(), "testhost: cd: /: Permission denied\n");
    // The caller's directory is untouched.
    assert_eq!(h.cwd, JAIL_ROOT);
}

#[tokio::test]
async fn test_shell_prompts_in_pty_mode() {
    let mut h = CommandHarness::new();
    h.pty = true;
    let mut input = ScriptedInput::new(["cd docs"]);
    let outcome = h.run(&["sh"], &mut input).await;
    assert_eq!(outcome.status, 0);
    assert_eq!(
        h.stdout.contents(),
        "root@testhost:/home/guest# root@testhost:/home/guest/docs# exit\n"
    );
}

#[tokio::test]
async fn test_shell_prompt_for_regular_user() {
    let mut h = CommandHarness::new();
    h.pty = true;
    h.user = "guest".to_string();
    let outcome = h.run(&["sh"], &mut no_input()).await;
    assert_eq!(outcome.status, 0);
    assert_eq!(h.stdout.contents(), "guest@testhost:~$ exit\n");
}

#[tokio::test]
async fn test_shell_reports_client_hangup() {
    let mut h = CommandHarness::new();
    let mut input = ScriptedInput::new(["false"]).ending_with(ExecError::ClientEof);
    let outcome = h.run(&["sh"], &mut input).await;
    assert_eq!(outcome.status, 1);
    assert_eq!(outcome.error, Some(ExecError::ClientEof));
}

// ---------------------------------------------------------------------------
// su
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_su_runs_nested_shell_as_target_user() {
    let mut h = CommandHarness::new();
    let mut input = ScriptedInput::new(["su alice", "id", "exit 4", "id"]);
    let outcome = h.run(&["sh"], &mut input).await;
    assert_eq!(outcome.status, 0);
    assert_eq!(
        h.stdout.contents(),
        "uid=1000(alice) gid=1000(alice) groups=1000(alice)\nuid=0(root) gid=0(root) groups=0(root)\n"
    );
}

#[tokio::test]
async fn test_su_status_is_nested_exit_status() {
    let mut h = CommandHarness::new();
    let mut input = ScriptedInput::new(["exit 4"]);
    let outcome = h.run(&["su", "alice"], &mut input).await;
    assert_eq!(outcome.status, 4);
}

#[tokio::test]
async fn test_su_defaults_to_root_and_swallows_hangup() {
    let mut h = CommandHarness::new();
    h.user = "guest".to_string();
    let mut input = ScriptedInput::new(["id", "false"]).ending_with(ExecError::ClientEof);
    let outcome = h.run(&["su"], &mut input).await;
    assert_eq!(outcome.status, 1);
    assert_eq!(outcome.error, None);
    assert_eq!(
        h.stdout.contents(),
        "uid=0(root) gid=0(root) groups=0(root)\n"
    );
}

#[tokio::test]
async fn test_su_prompt_uses_target_user() {
    let mut h = CommandHarness::new();
    h.pty = true;
    let mut input = ScriptedInput::new(["su bob"]);
    h.run(&["sh"], &mut input).await;
    let out = h.stdout.contents();
    assert!(out.starts_with("root@testhost:/home/guest# bob@testhost:/home/guest$ exit\n"));
    assert!(out.ends_with("root@testhost:/home/guest# exit\n"));
}

#[tokio::test]
async fn test_su_shell_starts_in_guest_home() {
    let mut h = CommandHarness::new();
    h.pty = true;
    let mut input = ScriptedInput::new(["cd docs", "su bob"]);
    h.run(&["sh"], &mut input).await;
    let out = h.stdout.contents();
    assert!(out.starts_with(
        "root@testhost:/home/guest# root@testhost:/home/guest/docs# bob@testhost:/home/guest$ exit\n"
    ));
    // The caller's directory is untouched by the nested shell.
    assert!(out.ends_with("root@testhost:/home/guest/docs# exit\n"));
}
