use std::fmt;

/// SQL join keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Left,
    Right,
    Inner,
    Full,
    Natural,
}

impl JoinKind {
    pub const ALL: [JoinKind; 5] = [
        JoinKind::Left,
        JoinKind::Right,
        JoinKind::Inner,
        JoinKind::Full,
        JoinKind::Natural,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Natural => "NATURAL JOIN",
        }
    }

    /// Natural joins match on shared column names and take no `ON` clause.
    pub fn takes_constraint(&self) -> bool {
        !matches!(self, JoinKind::Natural)
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}
