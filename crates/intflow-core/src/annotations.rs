use crate::block::BlockId;
use crate::values::GlobalId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where an annotation attaches. Instructions are addressed by position so
/// markers survive serialization; the IR is frozen once analysis starts, so
/// positions are stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    Instruction {
        function: String,
        block: BlockId,
        index: usize,
    },
    Terminator {
        function: String,
        block: BlockId,
    },
    Global(GlobalId),
}

impl Site {
    pub fn inst(function: impl Into<String>, block: BlockId, index: usize) -> Self {
        Site::Instruction {
            function: function.into(),
            block,
            index,
        }
    }

    pub fn term(function: impl Into<String>, block: BlockId) -> Self {
        Site::Terminator {
            function: function.into(),
            block,
        }
    }

    pub fn function(&self) -> Option<&str> {
        match self {
            Site::Instruction { function, .. } | Site::Terminator { function, .. } => {
                Some(function)
            }
            Site::Global(_) => None,
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Site::Instruction {
                function,
                block,
                index,
            } => write!(f, "{}::{}[{}]", function, block, index),
            Site::Terminator { function, block } => write!(f, "{}::{}[term]", function, block),
            Site::Global(id) => write!(f, "{}", id),
        }
    }
}

/// Diagnostic taxonomy written on the `error` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntErrorKind {
    Overflow,
    DivByZero,
    BadShift,
    ArrayOob,
    DeadTrueBranch,
    DeadFalseBranch,
}

impl IntErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntErrorKind::Overflow => "integer overflow",
            IntErrorKind::DivByZero => "divide by zero",
            IntErrorKind::BadShift => "bad shift",
            IntErrorKind::ArrayOob => "array index out of bound",
            IntErrorKind::DeadTrueBranch => "impossible true branch",
            IntErrorKind::DeadFalseBranch => "impossible false branch",
        }
    }
}

impl std::fmt::Display for IntErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String-valued metadata on three append-style channels. Each analysis
/// component owns exactly one channel per entity; nothing reads a channel it
/// did not write, except the sink channel feeding taint propagation.
/// Serialized as pair sequences: sites are structured keys, not strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationMap {
    #[serde(with = "indexmap::map::serde_seq")]
    taint: IndexMap<Site, String>,
    #[serde(with = "indexmap::map::serde_seq")]
    sink: IndexMap<Site, String>,
    #[serde(with = "indexmap::map::serde_seq")]
    error: IndexMap<Site, String>,
}

impl AnnotationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_taint(&mut self, site: Site, label: impl Into<String>) {
        self.taint.insert(site, label.into());
    }

    pub fn set_sink(&mut self, site: Site, name: impl Into<String>) {
        self.sink.insert(site, name.into());
    }

    pub fn set_error(&mut self, site: Site, kind: IntErrorKind) {
        self.error.insert(site, kind.as_str().to_string());
    }

    pub fn taint(&self, site: &Site) -> Option<&str> {
        self.taint.get(site).map(String::as_str)
    }

    pub fn sink(&self, site: &Site) -> Option<&str> {
        self.sink.get(site).map(String::as_str)
    }

    pub fn error(&self, site: &Site) -> Option<&str> {
        self.error.get(site).map(String::as_str)
    }

    pub fn tainted_sites(&self) -> impl Iterator<Item = (&Site, &str)> {
        self.taint.iter().map(|(s, l)| (s, l.as_str()))
    }

    pub fn sink_sites(&self) -> impl Iterator<Item = (&Site, &str)> {
        self.sink.iter().map(|(s, l)| (s, l.as_str()))
    }

    pub fn error_sites(&self) -> impl Iterator<Item = (&Site, &str)> {
        self.error.iter().map(|(s, l)| (s, l.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_are_independent() {
        let mut map = AnnotationMap::new();
        let site = Site::inst("f", BlockId(0), 2);
        map.set_taint(site.clone(), "source");
        map.set_sink(site.clone(), "kmalloc");
        map.set_error(site.clone(), IntErrorKind::Overflow);

        assert_eq!(map.taint(&site), Some("source"));
        assert_eq!(map.sink(&site), Some("kmalloc"));
        assert_eq!(map.error(&site), Some("integer overflow"));
        assert_eq!(map.taint(&Site::inst("f", BlockId(0), 3)), None);
    }

    #[test]
    fn test_error_strings() {
        assert_eq!(IntErrorKind::DivByZero.as_str(), "divide by zero");
        assert_eq!(
            IntErrorKind::DeadFalseBranch.as_str(),
            "impossible false branch"
        );
        assert_eq!(IntErrorKind::ArrayOob.as_str(), "array index out of bound");
    }
}
