// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words cloexec oneshot

use crate::LoopFlags;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(bin_name = "evloop")]
#[command(about = "⏱ Drive the epoll event loop through timer, descriptor, and signal scenarios")]
#[command(version)]
#[command(next_line_help = true)]
#[command(arg_required_else_help(true))]
/// More info: <https://docs.rs/clap/latest/clap/struct.Command.html#method.help_template>
#[command(
    help_template = "{about}\nVersion: {bin} {version}\n\nUSAGE:\n  evloop [\x1b[32mCommand\x1b[0m] [\x1b[34mOptions\x1b[0m]\n\n{all-args}\n",
    subcommand_help_heading("Command")
)]
pub struct CLIArg {
    #[command(subcommand)]
    pub command: CLICommand,

    #[command(flatten)]
    pub global_options: GlobalOption,
}

#[derive(Debug, Args)]
pub struct GlobalOption {
    #[arg(
        global = true,
        long,
        short = 'l',
        help = "Log loop activity to a file named `evloop_log.txt` for debugging"
    )]
    pub enable_logging: bool,

    #[arg(
        global = true,
        long,
        short = 'c',
        help = "Create the epoll descriptor with close-on-exec"
    )]
    pub cloexec: bool,
}

impl GlobalOption {
    #[must_use]
    pub fn loop_flags(&self) -> LoopFlags {
        if self.cloexec {
            LoopFlags::CloseOnExec
        } else {
            LoopFlags::None
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum CLICommand {
    #[clap(about = "🔔 Fire a single one-shot timer\n💡 Eg: `evloop oneshot --delay-ms 500`")]
    Oneshot {
        #[arg(long, default_value_t = 1000, help = "Delay before the timer fires")]
        delay_ms: u64,
    },

    #[clap(
        about = "🔁 Tick a periodic timer, then cancel it\n💡 Eg: `evloop periodic --runs 5`"
    )]
    Periodic {
        #[arg(long, default_value_t = 1000, help = "Timer period")]
        every_ms: u64,

        #[arg(long, default_value_t = 5, help = "Number of ticks before cancelling")]
        runs: u64,
    },

    #[clap(about = "✂ Cancel a long timer from a shorter one, before it fires")]
    Cancel {
        #[arg(long, default_value_t = 1000, help = "When the cancelling timer fires")]
        cancel_after_ms: u64,

        #[arg(long, default_value_t = 5000, help = "When the cancelled timer would fire")]
        timeout_ms: u64,
    },

    #[clap(about = "🧵 Watch a pipe with a raw epoll mask and write one byte to it")]
    Raw {},

    #[clap(
        about = "⛓ Chain one-shot timers, each callback registers the next one\n💡 Eg: `evloop chain --count 3`"
    )]
    Chain {
        #[arg(long, default_value_t = 1000, help = "Delay of every timer in the chain")]
        interval_ms: u64,

        #[arg(long, default_value_t = 3, help = "Total number of timers that fire")]
        count: u32,
    },

    #[clap(about = "📶 Deliver SIGUSR1 to this process and receive it through a signalfd")]
    Signal {
        #[arg(long, default_value_t = 100, help = "Delay before the signal is raised")]
        delay_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_consistent() { CLIArg::command().debug_assert(); }

    #[test]
    fn global_options_work_after_the_subcommand() {
        let it = CLIArg::try_parse_from(["evloop", "periodic", "--runs", "2", "--cloexec"])
            .unwrap();
        assert_eq!(it.global_options.loop_flags(), LoopFlags::CloseOnExec);
        assert!(!it.global_options.enable_logging);
        assert!(matches!(
            it.command,
            CLICommand::Periodic {
                every_ms: 1000,
                runs: 2
            }
        ));
    }

    #[test]
    fn cancel_defaults_leave_room_before_the_timeout() {
        let it = CLIArg::try_parse_from(["evloop", "cancel"]).unwrap();
        assert_eq!(it.global_options.loop_flags(), LoopFlags::None);
        assert!(matches!(
            it.command,
            CLICommand::Cancel {
                cancel_after_ms: 1000,
                timeout_ms: 5000
            }
        ));
    }
}
