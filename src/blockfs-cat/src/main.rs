mod blockfs_cat;

use log::error;
use std::env;
use std::path::PathBuf;

use crate::blockfs_cat::{run_blockfs_cat, BlockFsCatRunOptions, DEFAULT_BLOCKFS_CONFIG_PATH};

fn usage() -> String {
    format!(
        "usage: blockfs-cat <path> [--config <file>] [--offset <n>] [--ls] [--page-size <n>]\n\
         defaults:\n\
         --config {}",
        DEFAULT_BLOCKFS_CONFIG_PATH
    )
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("missing value for {}", flag))?;
    value
        .parse::<T>()
        .map_err(|_| format!("invalid value for {}: {}", flag, value))
}

fn parse_args(args: &[String]) -> Result<BlockFsCatRunOptions, String> {
    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        return Err(usage());
    }

    let mut options = BlockFsCatRunOptions::new(&args[0]);
    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --config".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--offset" => {
                i += 1;
                options.offset = parse_number("--offset", args.get(i))?;
            }
            "--page-size" => {
                i += 1;
                options.page_size = Some(parse_number("--page-size", args.get(i))?);
            }
            "--ls" => {
                options.list = true;
            }
            other => {
                return Err(format!("unknown argument: {}\n{}", other, usage()));
            }
        }
        i += 1;
    }

    Ok(options)
}

fn main() {
    env_logger::init();
    let args = env::args().skip(1).collect::<Vec<String>>();
    let options = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    };

    if let Err(err) = run_blockfs_cat(options) {
        error!("blockfs-cat failed: {}", err);
        std::process::exit(1);
    }
}
