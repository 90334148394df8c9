//! AMI message and action types

/// A decoded AMI frame: an ordered list of `Key: Value` headers plus the
/// raw command output carried by `Response: Follows` frames.
///
/// Header keys are matched case-insensitively, as AMI servers are not
/// consistent about casing (`ActionID` vs `ActionId` vs `actionid`).
/// Insertion order is preserved and repeated keys are allowed; `get`
/// returns the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, preserving order
    pub fn push_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.push((key.into(), value.into()));
    }

    /// First header value for `key`, matched case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in wire order
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw command output, present only on `Response: Follows` frames
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    /// Correlation identifier carried by the frame, if any
    pub fn action_id(&self) -> Option<u64> {
        self.get("ActionID").and_then(|v| v.trim().parse().ok())
    }

    /// True for frames answering a submitted action
    pub fn is_response(&self) -> bool {
        self.get("Response").is_some()
    }

    /// True for unsolicited or list-member event frames
    pub fn is_event(&self) -> bool {
        self.get("Event").is_some()
    }

    /// True when a response frame reports success. `Follows` counts:
    /// it is the success status of command-output responses.
    pub fn succeeded(&self) -> bool {
        self.get("Response")
            .map(|v| v.eq_ignore_ascii_case("Success") || v.eq_ignore_ascii_case("Follows"))
            .unwrap_or(false)
    }

    /// True for responses announcing that list events will follow
    pub fn starts_event_list(&self) -> bool {
        self.get("EventList")
            .map(|v| v.eq_ignore_ascii_case("start"))
            .unwrap_or(false)
    }

    /// True for the event closing an event list
    pub fn completes_event_list(&self) -> bool {
        self.get("EventList")
            .map(|v| v.eq_ignore_ascii_case("Complete"))
            .unwrap_or(false)
    }
}

/// A single outbound AMI command.
///
/// The correlation identifier is not part of the action itself; it is
/// assigned by the correlator when the action is written to the wire, so
/// identifiers stay unique per connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    verb: String,
    params: Vec<(String, String)>,
}

impl Action {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter, replacing any previous value for the same key
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.params.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.params.push((key, value.into()));
        self
    }

    /// The `Login` handshake action
    pub fn login(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::new("Login")
            .param("Username", username)
            .param("Secret", secret)
    }

    /// A `Command` action running a CLI command on the switch
    pub fn command(command: impl Into<String>) -> Self {
        Self::new("Command").param("Command", command)
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
