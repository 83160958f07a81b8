use anyhow::{anyhow, Result};

use geochoice_core::{Level, PlaceId};

pub const HELP: &str = "\
commands:
  show                 print all three lists
  country|state|city <id>
                       select an entry
  clear <level>        deselect a level and reset everything below it
  retry                reload every level that failed
  help                 this text
  quit                 save the selection and exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Show,
    Select(Level, PlaceId),
    Clear(Level),
    Retry,
    Help,
    Quit,
    Nothing,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Command::Nothing);
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(anyhow!("too many arguments: {}", line.trim()));
        }

        match (verb.to_ascii_lowercase().as_str(), arg) {
            ("show" | "ls", None) => Ok(Command::Show),
            ("retry", None) => Ok(Command::Retry),
            ("help" | "?", None) => Ok(Command::Help),
            ("quit" | "exit" | "q", None) => Ok(Command::Quit),
            ("clear", Some(name)) => Level::from_name(name)
                .map(Command::Clear)
                .ok_or_else(|| anyhow!("unknown level: {}", name)),
            (name, Some(id)) => {
                let level = Level::from_name(name).ok_or_else(|| anyhow!("unknown command: {}", name))?;
                let id: PlaceId = id.parse().map_err(|_| anyhow!("not an id: {}", id))?;
                Ok(Command::Select(level, id))
            }
            (name, None) => Err(anyhow!("unknown command: {} (try `help`)", name)),
        }
    }
}
