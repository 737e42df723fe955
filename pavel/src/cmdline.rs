use clap::{Arg, ArgAction, Command};
use pavel_core::config::DEFAULT_OFFSET;

pub(super) fn root_cli() -> Command {
    Command::new("pavel")
        .about("Produce file lines to a Kafka topic or consume a topic into a file")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(produce_subcmd())
        .subcommand(consume_subcmd())
}

fn broker_arg() -> Arg {
    Arg::new("broker")
        .help("Bootstrap broker(s), comma separated host:port")
        .required(true)
        .action(ArgAction::Set)
}

fn topic_arg() -> Arg {
    Arg::new("topic")
        .help("Topic name")
        .required(true)
        .action(ArgAction::Set)
}

fn produce_subcmd() -> Command {
    Command::new("produce")
        .about("Publish every line of a file as one message")
        .arg_required_else_help(true)
        .arg(broker_arg())
        .arg(topic_arg())
        .arg(
            Arg::new("file")
                .help("File whose lines are published")
                .required(true)
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
}

fn consume_subcmd() -> Command {
    Command::new("consume")
        .about("Append every message payload of a topic as a line to a file")
        .arg_required_else_help(true)
        .arg(
            Arg::new("listen")
                .long("listen")
                .help("Keep waiting for new messages after the topic is drained")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("offset")
                .long("offset")
                .help("Start offset: earliest, latest, stored, an absolute offset, or -N for the last N messages")
                .action(ArgAction::Set)
                .allow_hyphen_values(true)
                .default_value(DEFAULT_OFFSET),
        )
        .arg(broker_arg())
        .arg(topic_arg())
        .arg(
            Arg::new("file")
                .help("Output file, appended to. Standard output when omitted")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
}
