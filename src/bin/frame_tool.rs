use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lightsync::color::{Rgb, percent_to_level};
use lightsync::protocol::{Command, Frame};

/// Encode lightsync commands to wire frames, or check frames captured from a sniffer.
#[derive(Parser, Debug)]
#[command(name = "frame_tool", version)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    Power {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Brightness in percent (0-100).
    Brightness { percent: u8 },
    Color { r: u8, g: u8, b: u8 },
    KeepAlive,
    /// Validate and decode 20 hex bytes, e.g. `33 01 01 00 ... 33`.
    Parse { bytes: Vec<String> },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let command = match args.action {
        Action::Power { state } => Command::Power(state == "on"),
        Action::Brightness { percent } => {
            if percent > 100 {
                bail!("brightness must be 0-100, got {percent}");
            }
            Command::Brightness(percent_to_level(percent))
        }
        Action::Color { r, g, b } => Command::Color(Rgb::new(r, g, b)),
        Action::KeepAlive => Command::KeepAlive,
        Action::Parse { bytes } => return parse(&bytes),
    };
    println!("{}", command.encode());
    Ok(())
}

fn parse(words: &[String]) -> Result<()> {
    let bytes = words
        .iter()
        .flat_map(|w| w.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|w| !w.is_empty())
        .map(|w| {
            u8::from_str_radix(w.trim_start_matches("0x"), 16)
                .with_context(|| format!("invalid hex byte '{w}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    let frame = Frame::parse(&bytes).context("invalid frame")?;
    match Command::decode(&frame) {
        Some(command) => println!("{command:?}"),
        None => println!(
            "unknown command head=0x{:02x} cmd=0x{:02x}",
            frame.head(),
            frame.cmd()
        ),
    }
    Ok(())
}
