use serde::Deserialize;

/// How a session reacts to `capture_start` while capturing and
/// `capture_stop` while idle.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Return `AlreadyCapturing` / `NotCapturing`.
    Strict,
    /// Log and do nothing. A running capture is kept, not restarted.
    Lenient,
}

impl Strictness {
    pub fn by_name(name: &str) -> Result<Self, String> {
        match name {
            "strict" => Ok(Strictness::Strict),
            "lenient" => Ok(Strictness::Lenient),
            _ => Err(format!("{:?} is not a valid strictness", name)),
        }
    }
}

impl Default for Strictness {
    fn default() -> Self {
        Strictness::Strict
    }
}

/// Settings fixed for the lifetime of a `TraceSession`.
///
/// Deserializable so embedding applications can keep it in their own config
/// files; missing fields take their defaults.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    /// Maximum number of events open at once, across all threads.
    pub capacity: usize,
    /// Event names longer than this many bytes are truncated.
    pub max_name_len: usize,
    pub strictness: Strictness,
    /// Written as the `pid` of every record.
    pub process_id: u32,
}

impl TraceConfig {
    pub const DEFAULT_CAPACITY: usize = 1024;
    pub const DEFAULT_MAX_NAME_LEN: usize = 128;

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_name_len(mut self, max_name_len: usize) -> Self {
        self.max_name_len = max_name_len;
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_process_id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            capacity: Self::DEFAULT_CAPACITY,
            max_name_len: Self::DEFAULT_MAX_NAME_LEN,
            strictness: Strictness::default(),
            process_id: 0,
        }
    }
}
