//! Room prompt commands.
//!
//! One line of input maps to one `Command`. Task arguments accept either a
//! task id or the task's 1-based position in the backlog as rendered.

#[cfg(test)]
#[path = "command_test.rs"]
mod command_test;

use std::str::FromStr;

use crate::error::ClientError;
use crate::net::types::{Card, RoomSnapshot, Task};

pub const HELP: &str = "\
commands:
  vote <card>                 pick a card (0 1 2 3 5 8 13 21 34 55 89 ?)
  reveal                      show everyone's cards (admin)
  reset                       clear votes for a revote (admin)
  activate <task>             start voting on a task (admin)
  complete <task> <score>     close a task with a final score (admin)
  cancel <task>               cancel a task (admin)
  add <title> [| description] add a task to the backlog (admin)
  delete <task>               remove a task (admin)
  tasks                       redraw the room
  refresh                     fetch the room state now
  leave                       leave the room and forget the session
  quit                        exit, keeping the session
  help                        show this help";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Vote(Card),
    Reveal,
    Reset,
    Activate(String),
    Complete { task: String, score: Card },
    Cancel(String),
    Add { title: String, description: String },
    Delete(String),
    Tasks,
    Refresh,
    Leave,
    Quit,
    Help,
}

fn usage(text: &str) -> ClientError {
    ClientError::Validation(format!("usage: {text}"))
}

fn one_arg(rest: &str, text: &str) -> Result<String, ClientError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(arg), None) => Ok(arg.to_owned()),
        _ => Err(usage(text)),
    }
}

impl FromStr for Command {
    type Err = ClientError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match verb.to_ascii_lowercase().as_str() {
            "vote" | "v" => Ok(Self::Vote(one_arg(rest, "vote <card>")?.parse()?)),
            "reveal" => Ok(Self::Reveal),
            "reset" => Ok(Self::Reset),
            "activate" | "start" => Ok(Self::Activate(one_arg(rest, "activate <task>")?)),
            "complete" | "done" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(task), Some(score), None) => {
                        Ok(Self::Complete { task: task.to_owned(), score: score.parse()? })
                    }
                    _ => Err(usage("complete <task> <score>")),
                }
            }
            "cancel" => Ok(Self::Cancel(one_arg(rest, "cancel <task>")?)),
            "add" => {
                let (title, description) = rest.split_once('|').unwrap_or((rest, ""));
                if title.trim().is_empty() {
                    return Err(usage("add <title> [| description]"));
                }
                Ok(Self::Add { title: title.trim().to_owned(), description: description.trim().to_owned() })
            }
            "delete" | "rm" => Ok(Self::Delete(one_arg(rest, "delete <task>")?)),
            "tasks" | "ls" => Ok(Self::Tasks),
            "refresh" => Ok(Self::Refresh),
            "leave" => Ok(Self::Leave),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            "help" | "?" | "h" => Ok(Self::Help),
            "" => Err(ClientError::Validation("empty command; try `help`".to_owned())),
            other => Err(ClientError::Validation(format!("unknown command `{other}`; try `help`"))),
        }
    }
}

/// Find the task an argument refers to: a 1-based backlog position first,
/// then an exact id.
///
/// # Errors
///
/// `Validation` when nothing matches.
pub fn resolve_task<'a>(snapshot: &'a RoomSnapshot, arg: &str) -> Result<&'a Task, ClientError> {
    let by_position = arg
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| snapshot.tasks.get(i));
    by_position
        .or_else(|| snapshot.tasks.iter().find(|t| t.id == arg))
        .ok_or_else(|| ClientError::Validation(format!("no task `{arg}`")))
}
