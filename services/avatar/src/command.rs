/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `/camera on|off`
    Camera(bool),
    /// `/say <text>`: non-visual chat through the text path.
    Say(String),
    Connect,
    Disconnect,
    Help,
    Quit,
    /// Anything that is not a command is treated as heard speech.
    Utterance(String),
    Empty,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /camera on|off   toggle camera mode
  /say <text>      chat without the camera
  /connect         reconnect the avatar session
  /disconnect      drop the avatar session
  /quit            exit
Any other line is treated as something you said to the avatar.";

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Utterance(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match (name.to_lowercase().as_str(), arg) {
            ("camera", "on") => Self::Camera(true),
            ("camera", "off") => Self::Camera(false),
            ("say", text) if !text.is_empty() => Self::Say(text.to_string()),
            ("connect", _) => Self::Connect,
            ("disconnect", _) => Self::Disconnect,
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}
