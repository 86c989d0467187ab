//! Aspects and signal functions.

use serde::{Deserialize, Serialize};

/// Displayed state of a signal head.
///
/// Ordered by restriction: [`Aspect::Stop`] is the most restrictive and has
/// rank 0, [`Aspect::Clear2`] the least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aspect {
    Stop,
    StopAndProceed,
    Restricting,
    Approach1,
    Approach2,
    Approach3,
    Clear1,
    Clear2,
}

impl Aspect {
    /// Every aspect, most restrictive first.
    pub const ALL: [Aspect; 8] = [
        Aspect::Stop,
        Aspect::StopAndProceed,
        Aspect::Restricting,
        Aspect::Approach1,
        Aspect::Approach2,
        Aspect::Approach3,
        Aspect::Clear1,
        Aspect::Clear2,
    ];

    /// Rank in the restriction order; 0 is the most restrictive.
    pub const fn rank(self) -> u8 {
        match self {
            Aspect::Stop => 0,
            Aspect::StopAndProceed => 1,
            Aspect::Restricting => 2,
            Aspect::Approach1 => 3,
            Aspect::Approach2 => 4,
            Aspect::Approach3 => 5,
            Aspect::Clear1 => 6,
            Aspect::Clear2 => 7,
        }
    }

    pub fn is_more_restrictive_than(self, other: Aspect) -> bool {
        self.rank() < other.rank()
    }

    /// At least as permissive as `other`.
    pub fn is_at_least(self, other: Aspect) -> bool {
        self.rank() >= other.rank()
    }

    /// The more restrictive of two aspects.
    pub fn most_restrictive(self, other: Aspect) -> Aspect {
        if other.is_more_restrictive_than(self) { other } else { self }
    }

    /// The less restrictive of two aspects.
    pub fn least_restrictive(self, other: Aspect) -> Aspect {
        if self.is_more_restrictive_than(other) { other } else { self }
    }

    pub fn is_stop(self) -> bool {
        self == Aspect::Stop
    }

    /// Parse the conventional upper-case configuration name.
    pub fn from_name(name: &str) -> Option<Aspect> {
        let aspect = match name.to_ascii_uppercase().as_str() {
            "STOP" => Aspect::Stop,
            "STOP_AND_PROCEED" => Aspect::StopAndProceed,
            "RESTRICTING" => Aspect::Restricting,
            "APPROACH_1" => Aspect::Approach1,
            "APPROACH_2" => Aspect::Approach2,
            "APPROACH_3" => Aspect::Approach3,
            "CLEAR_1" => Aspect::Clear1,
            "CLEAR_2" => Aspect::Clear2,
            _ => return None,
        };
        Some(aspect)
    }
}

/// What a signal head is for. Open-ended: layouts may register extra functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalFunction {
    Normal,
    Distance,
    Repeater,
    Shunting,
    Info,
    Speed,
    Alert,
    /// Index into the layout's [`FunctionNames`] table.
    Custom(u16),
}

impl SignalFunction {
    pub const BUILT_IN: [SignalFunction; 7] = [
        SignalFunction::Normal,
        SignalFunction::Distance,
        SignalFunction::Repeater,
        SignalFunction::Shunting,
        SignalFunction::Info,
        SignalFunction::Speed,
        SignalFunction::Alert,
    ];

    pub fn is_normal(self) -> bool {
        self == SignalFunction::Normal
    }

    fn built_in_name(self) -> Option<&'static str> {
        let name = match self {
            SignalFunction::Normal => "NORMAL",
            SignalFunction::Distance => "DISTANCE",
            SignalFunction::Repeater => "REPEATER",
            SignalFunction::Shunting => "SHUNTING",
            SignalFunction::Info => "INFO",
            SignalFunction::Speed => "SPEED",
            SignalFunction::Alert => "ALERT",
            SignalFunction::Custom(_) => return None,
        };
        Some(name)
    }
}

/// Name table for signal functions, including layout-defined ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionNames {
    custom: Vec<String>,
}

impl FunctionNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a name, registering it as a custom function if unknown.
    pub fn resolve(&mut self, name: &str) -> SignalFunction {
        if let Some(function) = self.lookup(name) {
            return function;
        }
        self.custom.push(name.to_ascii_uppercase());
        SignalFunction::Custom((self.custom.len() - 1) as u16)
    }

    /// Resolve a name without registering it.
    pub fn lookup(&self, name: &str) -> Option<SignalFunction> {
        let upper = name.to_ascii_uppercase();
        if let Some(function) = SignalFunction::BUILT_IN
            .iter()
            .copied()
            .find(|f| f.built_in_name() == Some(upper.as_str()))
        {
            return Some(function);
        }
        self.custom
            .iter()
            .position(|n| *n == upper)
            .map(|i| SignalFunction::Custom(i as u16))
    }

    pub fn name(&self, function: SignalFunction) -> &str {
        match function {
            SignalFunction::Custom(i) => self
                .custom
                .get(i as usize)
                .map(String::as_str)
                .unwrap_or("UNKNOWN"),
            other => other.built_in_name().unwrap_or("UNKNOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_order() {
        assert!(Aspect::Stop.is_more_restrictive_than(Aspect::Restricting));
        assert!(Aspect::Clear2.is_at_least(Aspect::Approach1));
        assert_eq!(Aspect::Clear1.most_restrictive(Aspect::Approach2), Aspect::Approach2);
        assert_eq!(Aspect::Clear1.least_restrictive(Aspect::Approach2), Aspect::Clear1);
        for pair in Aspect::ALL.windows(2) {
            assert!(pair[0].is_more_restrictive_than(pair[1]));
        }
    }

    #[test]
    fn aspect_names() {
        assert_eq!(Aspect::from_name("approach_2"), Some(Aspect::Approach2));
        assert_eq!(Aspect::from_name("green"), None);
    }

    #[test]
    fn custom_functions_are_registered_once() {
        let mut names = FunctionNames::new();
        assert_eq!(names.resolve("normal"), SignalFunction::Normal);
        let level_crossing = names.resolve("LEVEL_CROSSING");
        assert_eq!(level_crossing, SignalFunction::Custom(0));
        assert_eq!(names.resolve("level_crossing"), level_crossing);
        assert_eq!(names.name(level_crossing), "LEVEL_CROSSING");
        assert_eq!(names.lookup("nothing"), None);
    }
}
