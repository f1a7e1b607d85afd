/// Result of a non-critical read.
///
/// `Degraded` carries the safe default that was substituted after the
/// underlying read failed. Callers can keep rendering with it, and tests
/// can tell the two apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Fresh(T),
    Degraded(T),
}

impl<T> Outcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Fresh(v) | Self::Degraded(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Fresh(v) | Self::Degraded(v) => v,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Fresh(v) => Outcome::Fresh(f(v)),
            Self::Degraded(v) => Outcome::Degraded(f(v)),
        }
    }

    /// Splits into the value and its degraded flag, the shape the JSON
    /// responses carry.
    pub fn into_parts(self) -> (T, bool) {
        let degraded = self.is_degraded();
        (self.into_inner(), degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_keeps_fallback_value() {
        let out: Outcome<u32> = Outcome::Degraded(0);
        assert!(out.is_degraded());
        assert_eq!(out.map(|v| v + 1).into_parts(), (1, true));
    }

    #[test]
    fn fresh_is_not_degraded() {
        let out = Outcome::Fresh("online");
        assert!(!out.is_degraded());
        assert_eq!(*out.value(), "online");
    }
}
