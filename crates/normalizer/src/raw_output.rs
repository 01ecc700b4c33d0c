//! The shape a replica hands a parser before normalisation: tools report
//! either structured JSON, free-form text meant to be scraped line-by-line,
//! or nothing beyond a process exit code.

#[derive(Debug, Clone)]
pub enum RawToolOutput {
    Json(serde_json::Value),
    Text(String),
    ExitCodeOnly(i32),
}

impl RawToolOutput {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            RawToolOutput::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawToolOutput::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RawToolOutput::ExitCodeOnly(code) => Some(*code),
            _ => None,
        }
    }
}
