//! Line commands understood by the interactive front end.

use std::str::FromStr;

use anyhow::{anyhow, bail};

pub const HELP: &str = "\
commands:
  play <key> [repeat]   start a sound (\"repeat\" adds an instance)
  stop <key>            stop every instance of a sound
  stop-all              stop everything
  volume <0..1>         set the master volume
  multi on|off          allow different sounds at once
  repeat on|off         allow several instances of one sound
  status                list playing instances
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play { key: String, repeat: bool },
    Stop(String),
    StopAll,
    Volume(f32),
    Multi(bool),
    Repeat(bool),
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(|| anyhow!("empty command"))?;

        let command = match name {
            "play" | "p" => {
                let key = required(words.next(), "play <key>")?;
                let repeat = match words.next() {
                    None => false,
                    Some("repeat") | Some("r") => true,
                    Some(other) => bail!("unexpected '{}' after play", other),
                };
                Command::Play { key, repeat }
            }
            "stop" | "s" => Command::Stop(required(words.next(), "stop <key>")?),
            "stop-all" | "sa" => Command::StopAll,
            "volume" | "v" => {
                let value = required(words.next(), "volume <0..1>")?;
                let volume: f32 = value
                    .parse()
                    .map_err(|_| anyhow!("'{}' is not a number", value))?;
                if !(0.0..=1.0).contains(&volume) {
                    bail!("volume must be between 0 and 1");
                }
                Command::Volume(volume)
            }
            "multi" => Command::Multi(switch(words.next())?),
            "repeat" => Command::Repeat(switch(words.next())?),
            "status" | "ls" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("unknown command '{}' (try 'help')", other),
        };

        if let Some(extra) = words.next() {
            bail!("unexpected '{}'", extra);
        }
        Ok(command)
    }
}

fn required(word: Option<&str>, usage: &str) -> anyhow::Result<String> {
    word.map(str::to_string)
        .ok_or_else(|| anyhow!("usage: {}", usage))
}

fn switch(word: Option<&str>) -> anyhow::Result<bool> {
    match word {
        Some("on") | Some("true") | Some("1") => Ok(true),
        Some("off") | Some("false") | Some("0") => Ok(false),
        _ => bail!("expected on or off"),
    }
}
