mod serve;

use std::path::PathBuf;

use anyhow::Result;
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("serve", "Run the broker daemon")
        .command("help", "Show this help")
        .print();

    GuideSection::new("Serve flags")
        .command("--host <addr>", "Bind address (default 127.0.0.1)")
        .command("--port <port>", "Listen port (default 18990)")
        .command("--data-dir <path>", "Data directory (default ~/.dispatchd)")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("dispatchd").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ServeFlags {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> ServeFlags {
    let mut flags = ServeFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    flags.host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    flags.port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--data-dir" => {
                if i + 1 < args.len() {
                    flags.data_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    flags
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        let cmd = args[1].as_str();
        match cmd {
            "serve" => {
                let flags = parse_serve_flags(&args, 2);
                serve::run_serve(flags).await
            }
            "version" | "--version" | "-V" => {
                println!("dispatchd {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
            "help" | "--help" | "-h" => {
                print_help();
                Ok(())
            }
            _ => {
                print_error(&format!("Unknown command: {}", cmd));
                print_help();
                Ok(())
            }
        }
    } else {
        print_help();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ServeFlags, parse_serve_flags};
    use std::path::PathBuf;

    #[test]
    fn parse_serve_flags_reads_host_port_and_data_dir() {
        let args = vec![
            "dispatchd".to_string(),
            "serve".to_string(),
            "--host".to_string(),
            "0.0.0.0".to_string(),
            "--port".to_string(),
            "19000".to_string(),
            "--data-dir".to_string(),
            "/tmp/broker".to_string(),
        ];
        let flags = parse_serve_flags(&args, 2);
        assert_eq!(flags.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(flags.port, Some(19000));
        assert_eq!(flags.data_dir, Some(PathBuf::from("/tmp/broker")));
    }

    #[test]
    fn parse_serve_flags_ignores_unknown_and_dangling_flags() {
        let args = vec![
            "dispatchd".to_string(),
            "serve".to_string(),
            "--verbose".to_string(),
            "--port".to_string(),
        ];
        let flags = parse_serve_flags(&args, 2);
        assert_eq!(flags, ServeFlags::default());
    }

    #[test]
    fn parse_serve_flags_keeps_invalid_port_unset() {
        let args = vec![
            "dispatchd".to_string(),
            "serve".to_string(),
            "--port".to_string(),
            "not-a-port".to_string(),
        ];
        let flags = parse_serve_flags(&args, 2);
        assert_eq!(flags.port, None);
    }
}
