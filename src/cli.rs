use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::session::{DEFAULT_STATE_FILE, Session};

pub const HELP_KEYS: &str = "\
Key Bindings:
  Right / l / Space : Next image
  Left / h          : Previous image
  Enter / p         : Pick image (copy to output directory)
  f                 : Toggle fullscreen
  i                 : Toggle info overlay
  ?                 : Toggle help overlay
  Esc / q           : Quit
";

#[derive(Parser, Debug)]
#[command(
    name = "picker",
    about = "Page through a tree of images and copy the ones you pick",
    after_help = HELP_KEYS
)]
pub struct Cli {
    /// Images directory for a new session (asked for if omitted)
    pub root: Option<PathBuf>,

    /// Shortlist output directory (asked for if omitted)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Session file used to resume
    #[arg(long, value_name = "FILE", default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,

    /// Resume the saved session without asking
    #[arg(long, conflicts_with = "new")]
    pub resume: bool,

    /// Start a new session even if one was saved
    #[arg(long)]
    pub new: bool,

    /// Follow symbolic links while scanning (default: false)
    #[arg(long)]
    pub follow_links: bool,

    /// Initial window width
    #[arg(long, default_value = "1280")]
    pub width: u32,

    /// Initial window height
    #[arg(long, default_value = "720")]
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Resume,
    New,
}

impl Cli {
    /// Decide between resuming and starting over. Asks only when a session
    /// exists and no flag settled it.
    pub fn start_mode(&self, saved: Option<&Session>) -> io::Result<StartMode> {
        let Some(saved) = saved else {
            return Ok(StartMode::New);
        };
        if self.resume {
            return Ok(StartMode::Resume);
        }
        if self.new || self.root.is_some() {
            return Ok(StartMode::New);
        }

        println!(
            "Last session: {} ({}/{}) -> {}",
            saved.root.display(),
            saved.current_index + 1,
            saved.total_images,
            saved.output_dir.display()
        );
        println!("1. Resume last operation");
        println!("2. Start new operation");
        let stdin = io::stdin();
        loop {
            let choice = prompt(&mut stdin.lock(), "Select option (1/2): ")?;
            match choice.as_str() {
                "1" => return Ok(StartMode::Resume),
                "2" => return Ok(StartMode::New),
                _ => println!("Invalid choice."),
            }
        }
    }

    /// Images root and output directory for a new session.
    pub fn new_session_paths(&self) -> io::Result<(PathBuf, PathBuf)> {
        let stdin = io::stdin();
        let root = match &self.root {
            Some(p) => p.clone(),
            None => expand_tilde(&prompt(&mut stdin.lock(), "Enter path to images directory: ")?),
        };
        let output = match &self.output {
            Some(p) => p.clone(),
            None => expand_tilde(&prompt(
                &mut stdin.lock(),
                "Enter path to shortlist output directory: ",
            )?),
        };
        Ok((root, output))
    }
}

fn prompt(input: &mut impl BufRead, question: &str) -> io::Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no input"));
    }
    Ok(line.trim().to_string())
}

/// Expand a leading `~` against `$HOME`.
pub fn expand_tilde(input: &str) -> PathBuf {
    expand_tilde_with(input, std::env::var_os("HOME").as_deref().map(Path::new))
}

fn expand_tilde_with(input: &str, home: Option<&Path>) -> PathBuf {
    match (input.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("picker").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.state, PathBuf::from(DEFAULT_STATE_FILE));
        assert!(cli.root.is_none());
        assert_eq!((cli.width, cli.height), (1280, 720));
        assert!(!cli.follow_links);
    }

    #[test]
    fn resume_and_new_conflict() {
        let args = ["picker", "--resume", "--new"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn start_mode_without_prompt() {
        let saved = Session::new("/a".into(), "/b".into(), 2, 10);
        assert_eq!(parse(&[]).start_mode(None).unwrap(), StartMode::New);
        assert_eq!(parse(&["--resume"]).start_mode(Some(&saved)).unwrap(), StartMode::Resume);
        assert_eq!(parse(&["--new"]).start_mode(Some(&saved)).unwrap(), StartMode::New);
        assert_eq!(parse(&["/pics"]).start_mode(Some(&saved)).unwrap(), StartMode::New);
    }

    #[test]
    fn prompt_trims_input() {
        let mut input = io::Cursor::new("  /tmp/pics \n");
        assert_eq!(prompt(&mut input, "? ").unwrap(), "/tmp/pics");
        let mut empty = io::Cursor::new("");
        assert!(prompt(&mut empty, "? ").is_err());
    }

    #[test]
    fn tilde_expansion() {
        let home = Path::new("/home/ada");
        assert_eq!(expand_tilde_with("~", Some(home)), PathBuf::from("/home/ada"));
        assert_eq!(expand_tilde_with("~/pics", Some(home)), PathBuf::from("/home/ada/pics"));
        assert_eq!(expand_tilde_with("/abs", Some(home)), PathBuf::from("/abs"));
        assert_eq!(expand_tilde_with("~/pics", None), PathBuf::from("~/pics"));
    }
}
