//! Command-line parsing for the `oneshot` binary.

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::Overrides;
use crate::part::PoolClass;

/// One parsed invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub command: Command,
    pub overrides: Overrides,
    /// Unrecognised flags, kept so the caller can report them once logging
    /// is up.
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Teach a part from one snapshot image.
    Add { part: String, snapshot: PathBuf },
    /// Store an extra positive or negative image for a part.
    Extra {
        part: String,
        class: PoolClass,
        image: PathBuf,
    },
    /// Regenerate features and retrain a part.
    Train { part: String },
    /// Score every frame in a directory.
    Run {
        part: String,
        frames: PathBuf,
        out: Option<PathBuf>,
    },
    /// Swap a part with its previous version.
    Restore { part: String },
    /// List known parts.
    List,
}

/// Parse arguments (without the program name).
///
/// Flags may appear anywhere. Unrecognised `--flags` are ignored and do not
/// consume the following argument.
pub fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut overrides = Overrides::default();
    let mut out: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();
    let mut ignored: Vec<String> = Vec::new();

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--num-samples" => {
                idx += 1;
                overrides.num_samples = Some(flag_value(&args, idx, "--num-samples")?);
            }
            "--embed" => {
                idx += 1;
                overrides.embed_size = Some(flag_value(&args, idx, "--embed")?);
            }
            "--epochs" => {
                idx += 1;
                overrides.epochs = Some(flag_value(&args, idx, "--epochs")?);
            }
            "--lower" => {
                idx += 1;
                overrides.lower = Some(flag_value(&args, idx, "--lower")?);
            }
            "--upper" => {
                idx += 1;
                overrides.upper = Some(flag_value(&args, idx, "--upper")?);
            }
            "--early" => {
                idx += 1;
                overrides.early_stopping = Some(flag_value(&args, idx, "--early")?);
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                out = Some(PathBuf::from(value));
            }
            unknown if unknown.starts_with("--") => ignored.push(unknown.to_string()),
            value => positional.push(value.to_string()),
        }
        idx += 1;
    }

    let command = parse_command(&positional, out)?;
    Ok(CliOptions {
        command,
        overrides,
        ignored,
    })
}

fn flag_value<T: FromStr>(args: &[String], idx: usize, flag: &str) -> Result<T, String> {
    let value = args.get(idx).ok_or_else(|| format!("{flag} requires a value"))?;
    value
        .parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {value}"))
}

fn parse_command(positional: &[String], out: Option<PathBuf>) -> Result<Command, String> {
    let Some((name, rest)) = positional.split_first() else {
        return Err(help_text());
    };
    let args: Vec<&str> = rest.iter().map(String::as_str).collect();
    let command = match (name.as_str(), args.as_slice()) {
        ("add", [part, snapshot]) => Command::Add {
            part: part.to_string(),
            snapshot: PathBuf::from(snapshot),
        },
        ("extra", [part, class, image]) => Command::Extra {
            part: part.to_string(),
            class: class.parse()?,
            image: PathBuf::from(image),
        },
        ("train", [part]) => Command::Train { part: part.to_string() },
        ("run", [part, frames]) => Command::Run {
            part: part.to_string(),
            frames: PathBuf::from(frames),
            out,
        },
        ("restore", [part]) => Command::Restore { part: part.to_string() },
        ("list", []) => Command::List,
        ("add" | "extra" | "train" | "run" | "restore" | "list", _) => {
            return Err(format!("Wrong arguments for {name}\n\n{}", help_text()));
        }
        (unknown, _) => return Err(format!("Unknown command: {unknown}\n\n{}", help_text())),
    };
    Ok(command)
}

pub fn help_text() -> String {
    [
        "oneshot",
        "",
        "Teach an object from one snapshot and recognise it in later frames.",
        "",
        "Usage:",
        "  oneshot add <part> <snapshot>",
        "  oneshot extra <part> <positive|negative> <image>",
        "  oneshot train <part>",
        "  oneshot run <part> <frames-dir> [--out <dir>]",
        "  oneshot restore <part>",
        "  oneshot list",
        "",
        "Options:",
        "  --num-samples <n>   Augmented samples per class (default 200)",
        "  --embed <n>         Projection width (default 256)",
        "  --epochs <n>        Training epochs (default 10)",
        "  --lower <f>         Possible-match threshold (default 0.80)",
        "  --upper <f>         Match threshold (default 0.95)",
        "  --early <n>         Early-stopping patience, 0 disables (default off)",
        "  --out <dir>         Write annotated frames during run",
    ]
    .join("\n")
}
