//! Interactive shell against a coordinator

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use shardstore::coordinator::{ClientConfig, StoreClient};
use shardstore::error::Error;
use shardstore::protocol::{ArchiveKind, Operation, ProtocolError};
use shardstore::router::extension_of;
use shardstore::store::StorageError;

const PROMPT: &str = "client24s$ ";

/// Extensions the shell will upload
const UPLOADABLE: &[&str] = &["c", "txt", "pdf"];

/// One parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Upload { local: PathBuf, dest: String },
    Download { path: String },
    Delete { path: String },
    List { path: String },
    Archive { kind: ArchiveKind },
    Exit,
    Empty,
}

fn usage(operation: Operation) -> String {
    let args = match operation {
        Operation::Upload => "<localFile> <destRelPath>",
        Operation::Download | Operation::Delete | Operation::List => "<relPath>",
        Operation::Archive => "<c|txt|pdf>",
    };
    format!("Invalid usage\nUsage: {} {}", operation.verb(), args)
}

/// Parse a shell line. `Err` carries the message to show the user.
pub fn parse_line(line: &str) -> Result<ShellCommand, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Ok(ShellCommand::Empty);
    };
    if verb == "exit" || verb == "quit" {
        return Ok(ShellCommand::Exit);
    }

    let operation = Operation::from_verb(verb).ok_or_else(|| format!("Unknown command: {verb}"))?;
    let expected = match operation {
        Operation::Upload => 2,
        _ => 1,
    };
    if args.len() != expected {
        return Err(usage(operation));
    }

    let command = match operation {
        Operation::Upload => {
            let local = args[0];
            match extension_of(local) {
                Some(ext) if UPLOADABLE.contains(&ext) => {}
                _ => {
                    return Err(
                        "Invalid file extension\nSupported file extensions: .txt, .c, .pdf".to_string(),
                    )
                }
            }
            ShellCommand::Upload {
                local: PathBuf::from(local),
                dest: args[1].to_string(),
            }
        }
        Operation::Download => ShellCommand::Download {
            path: args[0].to_string(),
        },
        Operation::Delete => ShellCommand::Delete {
            path: args[0].to_string(),
        },
        Operation::List => ShellCommand::List {
            path: args[0].to_string(),
        },
        Operation::Archive => ShellCommand::Archive {
            kind: args[0].parse().map_err(|e: ProtocolError| e.to_string())?,
        },
    };
    Ok(command)
}

/// Read commands from stdin until `exit` or end of input
pub async fn client(server: String) -> Result<()> {
    let mut store = StoreClient::connect(&ClientConfig::new(&server))
        .await
        .with_context(|| format!("Failed to connect to {server}"))?;
    tracing::info!(server = %server, "connected to coordinator");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{PROMPT}");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let command = match parse_line(&line) {
            Ok(ShellCommand::Exit) => break,
            Ok(ShellCommand::Empty) => continue,
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match run(&mut store, command).await {
            Ok(message) => println!("{message}"),
            Err(e) if e.is_fatal() => {
                println!("Connection to server lost: {e}");
                return Err(e.into());
            }
            Err(e) => println!("Error: {e}"),
        }
    }

    Ok(())
}

async fn run<S>(store: &mut StoreClient<S>, command: ShellCommand) -> Result<String, Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    match command {
        ShellCommand::Upload { local, dest } => {
            let name = file_name(&local);
            store.upload_file(&name, &dest, &local).await
        }
        ShellCommand::Download { path } => {
            let target = PathBuf::from(file_name(Path::new(&path)));
            let mut file = create_local(&target).await?;
            let outcome = store.download(&path, &mut file).await;
            let bytes = keep_or_remove(&target, outcome).await?;
            Ok(format!("Downloaded {} ({bytes} bytes)", target.display()))
        }
        ShellCommand::Delete { path } => store.delete(&path).await,
        ShellCommand::List { path } => {
            let listing = store.list(&path).await?;
            if listing.is_empty() {
                Ok("No files found".to_string())
            } else {
                Ok(listing.trim_end().to_string())
            }
        }
        ShellCommand::Archive { kind } => {
            let target = PathBuf::from(kind.archive_name());
            let mut file = create_local(&target).await?;
            let outcome = store.archive(kind, &mut file).await;
            let bytes = keep_or_remove(&target, outcome).await?;
            Ok(format!("Saved {} ({bytes} bytes)", target.display()))
        }
        ShellCommand::Exit | ShellCommand::Empty => Ok(String::new()),
    }
}

async fn create_local(target: &Path) -> Result<tokio::fs::File, Error> {
    let file = tokio::fs::File::create(target)
        .await
        .map_err(|source| StorageError::Create {
            path: target.to_path_buf(),
            source,
        })?;
    Ok(file)
}

/// A failed download leaves no partial file behind
async fn keep_or_remove(target: &Path, outcome: Result<u64, Error>) -> Result<u64, Error> {
    if outcome.is_err() {
        let _ = tokio::fs::remove_file(target).await;
    }
    outcome
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload() {
        assert_eq!(
            parse_line("upload ./src/main.c proj/src").unwrap(),
            ShellCommand::Upload {
                local: PathBuf::from("./src/main.c"),
                dest: "proj/src".to_string(),
            }
        );
        // Legacy verb
        assert!(matches!(
            parse_line("ufile notes.txt docs"),
            Ok(ShellCommand::Upload { .. })
        ));
    }

    #[test]
    fn test_upload_rejects_other_extensions() {
        let err = parse_line("upload photo.png pics").unwrap_err();
        assert!(err.contains("Supported file extensions"));
        assert!(parse_line("upload Makefile build").is_err());
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse_line("download").unwrap_err().contains("Usage: download"));
        assert!(parse_line("delete a.c b.c").unwrap_err().contains("Usage: delete"));
        assert!(parse_line("frobnicate x").unwrap_err().contains("Unknown command"));
        assert!(parse_line("archive zip").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_line("   ").unwrap(), ShellCommand::Empty);
        assert_eq!(parse_line("exit").unwrap(), ShellCommand::Exit);
        assert_eq!(
            parse_line("dtar pdf").unwrap(),
            ShellCommand::Archive {
                kind: ArchiveKind::Pdf
            }
        );
        assert_eq!(
            parse_line("display /").unwrap(),
            ShellCommand::List {
                path: "/".to_string()
            }
        );
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("notes/report.pdf")), "report.pdf");
        assert_eq!(file_name(Path::new("a.c")), "a.c");
    }
}
