use serde::{Deserialize, Serialize};

/// Listing venue, derived from the numeric code prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Shanghai,
    Shenzhen,
    Beijing,
    Unknown,
}

impl Region {
    pub fn from_code(code: &str) -> Self {
        if code.starts_with("60") || code.starts_with("68") {
            Region::Shanghai
        } else if code.starts_with("00") || code.starts_with("30") {
            Region::Shenzhen
        } else if code.starts_with('8') || code.starts_with('4') || code.starts_with("92") {
            Region::Beijing
        } else {
            Region::Unknown
        }
    }

    /// Vendor-facing market prefix (`sh600519`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Region::Shanghai => "sh",
            Region::Shenzhen => "sz",
            Region::Beijing => "bj",
            Region::Unknown => "",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Shanghai => "SH",
            Region::Shenzhen => "SZ",
            Region::Beijing => "BJ",
            Region::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "SH" => Region::Shanghai,
            "SZ" => Region::Shenzhen,
            "BJ" => Region::Beijing,
            _ => Region::Unknown,
        }
    }
}

/// Board classification tag stored alongside the symbol.
pub fn board_of(code: &str) -> &'static str {
    if code.starts_with("60") {
        "sh-main"
    } else if code.starts_with("00") {
        "sz-main"
    } else if code.starts_with("68") {
        "star"
    } else if code.starts_with("30") {
        "chinext"
    } else if code.starts_with('8') || code.starts_with('4') || code.starts_with("92") {
        "bse"
    } else {
        "other"
    }
}

/// A monitored instrument. Only `active` is consulted by the ingestion path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub code: String,
    pub name: String,
    pub region: Region,
    pub kind: String,
    pub active: bool,
    pub tags: Option<String>,
}

impl Symbol {
    pub fn new(code: impl Into<String>, name: impl Into<String>, active: bool) -> Self {
        let code = code.into();
        Self {
            region: Region::from_code(&code),
            kind: board_of(&code).to_string(),
            code,
            name: name.into(),
            active,
            tags: None,
        }
    }

    pub fn to_ref(&self) -> SymbolRef {
        SymbolRef {
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }
}

/// The part of a symbol that travels through the task queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    pub code: String,
    pub name: String,
}

impl SymbolRef {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    /// Code with vendor market prefix, e.g. `sz000001`.
    pub fn vendor_code(&self) -> String {
        format!("{}{}", Region::from_code(&self.code).prefix(), self.code)
    }
}
