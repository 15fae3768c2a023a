//! Interactive song length calculator for filling in song sheets.
//!
//! Prompts for the start and end of a song (plain seconds or a link with a
//! time marker) and prints the length rounded to ten seconds. Enter "o" as
//! the start to continue from the previous end. q, quit, stop or a exits.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use clap::Parser;

use livecut::timer::{format_length, is_quit, parse_timer_input, song_length, REUSE_LAST};
use livecut::{Platform, TimeOffset};

#[derive(Parser, Debug)]
#[command(name = "stream_timer", version, about = "Song length from start and end timestamps")]
struct Cli {
    /// youtube, twitch or live
    #[arg(short, long, default_value = "youtube")]
    platform: Platform,
}

/// Prompt until a valid offset is entered. `None` means quit.
fn prompt<R: BufRead>(
    input: &mut R,
    label: &str,
    platform: Platform,
    last_end: Option<TimeOffset>,
) -> Result<Option<TimeOffset>> {
    loop {
        print!("{}\t", label);
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim();
        if is_quit(line) {
            return Ok(None);
        }
        if line == REUSE_LAST {
            match last_end {
                Some(end) => return Ok(Some(end)),
                None => {
                    eprintln!("No previous end to reuse");
                    continue;
                }
            }
        }

        match parse_timer_input(line, platform) {
            Ok(offset) => return Ok(Some(offset)),
            Err(e) => eprintln!("{}", e),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut last_end: Option<TimeOffset> = None;

    loop {
        let Some(start) = prompt(&mut input, "Beginning:", cli.platform, last_end)? else {
            break;
        };
        println!("{}", format_length(start.as_secs()));

        let Some(end) = prompt(&mut input, "End:", cli.platform, None)? else {
            break;
        };
        println!("{}", format_length(end.as_secs()));
        println!();

        match song_length(start, end) {
            Ok(length) => println!("Time: \t {}", format_length(length)),
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        }
        last_end = Some(end);

        println!();
        println!("------------------------------------------------");
        println!();
    }

    Ok(())
}
