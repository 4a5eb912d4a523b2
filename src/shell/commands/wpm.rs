//! `wpm`, a package manager that never manages anything. Every path fails.

use crate::shell::commands::{ExecutionContext, Outcome};
use std::time::Duration;

pub const UPSTREAM: &str = "https://mirrors.tuna.tsinghua.edu.cn/debian";

const FETCH_DELAY: Duration = Duration::from_secs(1);

const KERNEL_FAULT: &str = "
kernel: general protection fault: 0000 [#1] SMP PTI
CPU: 0 PID: 1234 Comm: wpm Tainted: G        W        5.15.0-101-generic #1-WindOS
Hardware name: QEMU QEMU Virtual Machine, BIOS 0.0.0 02/06/2015
RIP: 0010:0x0
Code: Bad RIP value.
RSP: 0018:ffffc90000abcde0 EFLAGS: 00010246
RAX: 0000000000000000 RBX: 0000000000000001 RCX: 0000000000000000
RDX: 0000000000000000 RSI: 0000000000000000 RDI: 0000000000000000
RBP: ffffc90000abcdf0 R08: 0000000000000000 R09: 0000000000000000
R10: 0000000000000000 R11: 0000000000000000 R12: 0000000000000000
R13: 0000000000000000 R14: 0000000000000000 R15: 0000000000000000
FS:  00007f0000000000(0000) GS:ffff888888888888(0000) knlGS:0000000000000000
CS:  0010 DS: 0000 ES: 0000 CR0: 0000000080050033
CR2: 0000000000000000 CR3: 000000011abcdef0 CR4: 00000000000406f0
Call Trace:
 ? panic+0x1a/0x20
 ? oops_end+0xb0/0xb0
 ? die+0x43/0x50
 ? do_general_protection+0x74/0x80
 ? general_protection_interrupt+0x2e/0x30
 <IRQ>
 ? net_rx_action+0x14e/0x3a0
 ? __do_softirq+0xe1/0x2c2
 ? irq_exit_rcu+0x95/0xc0
 ? sysvec_apic_timer_interrupt+0x4d/0x90
 </IRQ>
 ? asm_sysvec_apic_timer_interrupt+0x12/0x20
RIP: 0010:0x0
---[ end trace ]---
";

pub async fn run(ctx: ExecutionContext<'_>) -> Outcome {
    let Some(sub) = ctx.arg(1) else {
        let written = ctx
            .stderr
            .write_str("Usage: wpm <command> [options...]\nCommands: update, upgrade, list, search, install, remove\n")
            .await;
        return Outcome::after_write(1, written);
    };

    let written = match sub {
        "update" | "upgrade" => {
            let _ = ctx
                .stdout
                .write_line(&format!("Fetching package lists from {} ...", UPSTREAM))
                .await;
            tokio::time::sleep(FETCH_DELAY).await;
            let trace = format!(
                "{}E: Kernel fault while contacting {}. Package lists could not be updated.\n",
                KERNEL_FAULT, UPSTREAM
            );
            ctx.stderr.write_str(&trace).await
        }
        "list" | "search" => {
            ctx.stderr
                .write_line("E: Package lists are missing. Run 'wpm update' first.")
                .await
        }
        "install" => match ctx.arg(2) {
            None => ctx.stderr.write_line("Usage: wpm install <package>").await,
            Some(package) => {
                let msg = format!(
                    "E: Unable to locate package '{}'. Run 'wpm update' first.",
                    package
                );
                ctx.stderr.write_line(&msg).await
            }
        },
        "remove" | "purge" => match ctx.arg(2) {
            None => ctx.stderr.write_line("Usage: wpm remove <package>").await,
            Some(package) => {
                let msg = format!(
                    "E: Package '{}' is an essential system component and cannot be removed.",
                    package
                );
                ctx.stderr.write_line(&msg).await
            }
        },
        other => {
            let msg = format!("{}: wpm: unknown command '{}'", ctx.hostname, other);
            ctx.stderr.write_line(&msg).await
        }
    };
    Outcome::after_write(1, written)
}

/// `apt` and `apt-get` only point at `wpm`.
pub async fn run_apt(ctx: ExecutionContext<'_>) -> Outcome {
    let written = ctx
        .stderr
        .write_line("Note: use 'wpm' for package management on this system.")
        .await;
    Outcome::after_write(1, written)
}
