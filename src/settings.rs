use std::path::PathBuf;

use crate::args::{Args, Command};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("State file \"{0}\" does not exist")]
    StateNotFound(String),
    #[error("\"{0}\" is not a directory")]
    NotDirectory(String),
}

/// What the app was asked to do, with paths checked.
#[derive(Debug)]
pub enum Action {
    Info(Vec<PathBuf>),
    Queueid { state: PathBuf, id: String },
    Set { state: PathBuf, field: String, value: String },
    Invalidate(Vec<PathBuf>),
    Status(PathBuf),
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. paths are checked.
#[derive(Debug)]
pub struct Settings {
    pub action: Action,
    pub yes: bool,
    pub verbose: u8,
    pub dry_run: bool,
}

fn state_path(arg: &str) -> Result<PathBuf, Error> {
    let mut path = PathBuf::from(arg);
    if path.extension().is_none() {
        path.set_extension("json");
    }
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::StateNotFound(arg.to_owned()))
    }
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let action = match args.command {
            Command::Info { states } => {
                Action::Info(states.iter().map(|s| state_path(s)).collect::<Result<_, _>>()?)
            }
            Command::Queueid { state, id } => Action::Queueid {
                state: state_path(&state)?,
                id,
            },
            Command::Set {
                state,
                field,
                value,
            } => Action::Set {
                state: state_path(&state)?,
                field,
                value,
            },
            Command::Invalidate { states } => {
                Action::Invalidate(states.iter().map(|s| state_path(s)).collect::<Result<_, _>>()?)
            }
            Command::Status { dir } => {
                let path = PathBuf::from(&dir);
                if !path.is_dir() {
                    return Err(Error::NotDirectory(dir).into());
                }
                Action::Status(path)
            }
        };

        Ok(Self {
            action,
            yes: args.yes,
            verbose: args.verbose,
            dry_run: args.dry_run,
        })
    }
}
