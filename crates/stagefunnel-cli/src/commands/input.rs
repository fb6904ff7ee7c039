//! Line commands shared by `play` (stdin) and `simulate` (scripts).

use stagefunnel_core::{CoreError, Funnel, FunnelEvent, Gender, LastActive, Relocation, Stage};

pub const HELP: &str = "\
commands:
  start | submit | continue | unlock | dismiss
  phone <text> | gender <male|female|non_binary>
  last-active <last_7_days|last_30_days|over_a_month|not_sure>
  relocation <yes|no|unknown>
  next | prev | jump <index>
  snapshot | steps | help | quit
  wait <ms> | wait-for <stage>   (simulate only)";

/// Something that changes or reads the funnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    Submit,
    Continue,
    Unlock,
    Dismiss,
    Phone(String),
    Gender(Gender),
    LastActive(LastActive),
    Relocation(Relocation),
    Next,
    Prev,
    Jump(usize),
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Action(Action),
    Steps,
    /// Advance the virtual clock by this many milliseconds.
    Wait(u64),
    /// Advance the virtual clock until the stage is reached.
    WaitFor(Stage),
    Help,
    Quit,
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = |name: &str| -> Result<&str, String> {
        if rest.is_empty() {
            Err(format!("'{word}' needs {name}"))
        } else {
            Ok(rest)
        }
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "start" => Input::Action(Action::Start),
        "submit" => Input::Action(Action::Submit),
        "continue" => Input::Action(Action::Continue),
        "unlock" => Input::Action(Action::Unlock),
        "dismiss" => Input::Action(Action::Dismiss),
        "phone" => Input::Action(Action::Phone(rest.to_string())),
        "gender" => Input::Action(Action::Gender(
            arg("a gender")?.parse().map_err(|e| format!("{e}"))?,
        )),
        "last-active" | "last_active" => Input::Action(Action::LastActive(
            arg("a recency")?.parse().map_err(|e| format!("{e}"))?,
        )),
        "relocation" => Input::Action(Action::Relocation(
            arg("an answer")?.parse().map_err(|e| format!("{e}"))?,
        )),
        "next" => Input::Action(Action::Next),
        "prev" => Input::Action(Action::Prev),
        "jump" => Input::Action(Action::Jump(
            arg("an index")?
                .parse()
                .map_err(|_| format!("invalid index '{rest}'"))?,
        )),
        "snapshot" => Input::Action(Action::Snapshot),
        "steps" => Input::Steps,
        "wait" => Input::Wait(
            arg("milliseconds")?
                .parse()
                .map_err(|_| format!("invalid duration '{rest}'"))?,
        ),
        "wait-for" | "wait_for" => {
            let name = arg("a stage")?.to_ascii_lowercase();
            let stage = Stage::ALL
                .into_iter()
                .find(|s| s.as_str() == name)
                .ok_or_else(|| format!("unknown stage '{rest}'"))?;
            Input::WaitFor(stage)
        }
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(input))
}

impl Action {
    pub fn apply(self, funnel: &mut Funnel) -> Result<Vec<FunnelEvent>, CoreError> {
        let events = match self {
            Action::Start => funnel.start()?,
            Action::Submit => funnel.submit()?,
            Action::Continue => funnel.continue_to_report()?,
            Action::Unlock => funnel.unlock()?,
            Action::Dismiss => funnel.dismiss_notification().into_iter().collect(),
            Action::Phone(text) => funnel.set_phone(&text)?,
            Action::Gender(g) => vec![funnel.set_gender(g)?],
            Action::LastActive(v) => vec![funnel.set_last_active(v)?],
            Action::Relocation(v) => vec![funnel.set_relocation(v)?],
            Action::Next => vec![funnel.carousel_next()],
            Action::Prev => vec![funnel.carousel_prev()],
            Action::Jump(i) => vec![funnel.carousel_jump(i)?],
            Action::Snapshot => vec![funnel.snapshot()],
        };
        Ok(events)
    }
}
