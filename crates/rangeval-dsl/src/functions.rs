//! Built-in functions callable from rule text
//!
//! The parser only needs names and arities; evaluation lives with the
//! validator runtime.

/// A built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `len(v)`: character count, 0 for empty
    Len,
    /// `not(v)`: logical negation
    Not,
    /// `isdate(v)`: `YYYY-MM-DD` calendar date
    IsDate,
    /// `istime(v)`: `HH:MM` 24-hour time
    IsTime,
    /// `isnumber(v)`
    IsNumber,
    /// `today()`: evaluation date as `YYYY-MM-DD`
    Today,
    /// `year(date)`
    Year,
    /// `datediff(a, b)`: days from `b` to `a`
    DateDiff,
    Abs,
    /// `round(v[, places])`
    Round,
    Lower,
    Upper,
    /// `substr(s, start[, length])`, zero-based
    Substr,
    /// `decimals(v)`: digits after the decimal point
    Decimals,
    /// `onstep(v, origin, step)`: `v` lies on the grid `origin + k*step`
    OnStep,
    /// `contains(haystack, needle)`
    Contains,
}

const ALL: [Builtin; 16] = [
    Builtin::Len,
    Builtin::Not,
    Builtin::IsDate,
    Builtin::IsTime,
    Builtin::IsNumber,
    Builtin::Today,
    Builtin::Year,
    Builtin::DateDiff,
    Builtin::Abs,
    Builtin::Round,
    Builtin::Lower,
    Builtin::Upper,
    Builtin::Substr,
    Builtin::Decimals,
    Builtin::OnStep,
    Builtin::Contains,
];

impl Builtin {
    /// Look up a function by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        ALL.iter().copied().find(|f| f.name() == lower)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Not => "not",
            Self::IsDate => "isdate",
            Self::IsTime => "istime",
            Self::IsNumber => "isnumber",
            Self::Today => "today",
            Self::Year => "year",
            Self::DateDiff => "datediff",
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Substr => "substr",
            Self::Decimals => "decimals",
            Self::OnStep => "onstep",
            Self::Contains => "contains",
        }
    }

    /// Accepted argument counts (min, max)
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Self::Today => (0, 0),
            Self::Len
            | Self::Not
            | Self::IsDate
            | Self::IsTime
            | Self::IsNumber
            | Self::Year
            | Self::Abs
            | Self::Lower
            | Self::Upper
            | Self::Decimals => (1, 1),
            Self::Round => (1, 2),
            Self::DateDiff | Self::Contains => (2, 2),
            Self::Substr => (2, 3),
            Self::OnStep => (3, 3),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        let (min, max) = self.arity();
        (min..=max).contains(&count)
    }

    pub fn all() -> &'static [Builtin] {
        &ALL
    }
}

impl std::fmt::Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(Builtin::from_name("LEN"), Some(Builtin::Len));
        assert_eq!(Builtin::from_name("isDate"), Some(Builtin::IsDate));
        assert_eq!(Builtin::from_name("sqrt"), None);
    }

    #[test]
    fn arities() {
        assert!(Builtin::Today.accepts(0));
        assert!(!Builtin::Today.accepts(1));
        assert!(Builtin::Substr.accepts(2));
        assert!(Builtin::Substr.accepts(3));
        assert!(!Builtin::OnStep.accepts(2));
    }

    #[test]
    fn names_round_trip() {
        for f in Builtin::all() {
            assert_eq!(Builtin::from_name(f.name()), Some(*f));
        }
    }
}
