use crate::{Error, Value};

/// Reconciles divergent replica copies of a single key into one winner.
///
/// Implementations must be deterministic, associative and commutative:
/// resolving in any grouping or order yields the same winner, and a
/// singleton resolves to itself.
pub trait ConflictResolver: Send + Sync {
    fn resolve<'v>(&self, values: &'v [Value]) -> crate::Result<&'v Value>;
}

/// Last-writer-wins: the maximum by `(version, created_at)`.
///
/// An unversioned value orders below any versioned one. When no value
/// carries a version, the newest `created_at` wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct LastWriteWins;

impl ConflictResolver for LastWriteWins {
    fn resolve<'v>(&self, values: &'v [Value]) -> crate::Result<&'v Value> {
        values
            .iter()
            .max_by(|a, b| {
                (a.version.as_ref(), a.created_at).cmp(&(b.version.as_ref(), b.created_at))
            })
            .ok_or(Error::EmptyResolveInput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Version;

    fn versioned(data: &str, ts: i64, node: &str) -> Value {
        Value::new(data.to_owned()).with_version(Version::new(ts, node))
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            LastWriteWins.resolve(&[]),
            Err(Error::EmptyResolveInput)
        ));
    }

    #[test]
    fn singleton_resolves_to_itself() {
        let v = versioned("only", 10, "n1");
        let won = LastWriteWins.resolve(std::slice::from_ref(&v)).unwrap();
        assert_eq!(won, &v);
    }

    #[test]
    fn highest_version_wins_in_any_order() {
        let a = versioned("old", 1000, "n1");
        let b = versioned("old", 1000, "n2");
        let c = versioned("new", 2000, "n1");

        for perm in [
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), a.clone(), b.clone()],
            vec![b.clone(), c.clone(), a.clone()],
        ] {
            let won = LastWriteWins.resolve(&perm).unwrap();
            assert_eq!(won.data, c.data);
        }
    }

    #[test]
    fn versioned_beats_unversioned() {
        let mut plain = Value::new("plain");
        plain.created_at = i64::MAX; // newer creation time does not matter
        let v = versioned("versioned", 1, "n1");

        let values = [plain, v.clone()];
        let won = LastWriteWins.resolve(&values).unwrap();
        assert_eq!(won, &v);
    }

    #[test]
    fn unversioned_ties_fall_back_to_creation_time() {
        let mut older = Value::new("older");
        older.created_at = 100;
        let mut newer = Value::new("newer");
        newer.created_at = 200;

        let won = LastWriteWins
            .resolve(&[older, newer.clone()])
            .unwrap()
            .clone();
        assert_eq!(won, newer);
    }
}
