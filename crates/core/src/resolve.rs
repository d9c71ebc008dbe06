//! Alias-following fact resolution.

use tracing::warn;

use crate::{FactoidDb, Result};

/// Longest chain of aliases followed from the requested key.
pub const MAX_ALIAS_DEPTH: usize = 16;

/// The key an alias line points at, if `line` is an alias line.
///
/// `"= P.3"` and `"=P.3"` both name `P.3`. A bare `"="` names nothing.
pub fn alias_target(line: &str) -> Option<&str> {
    let target = line.strip_prefix('=')?.trim();
    (!target.is_empty()).then_some(target)
}

/// Fetch `key` through the group gate and splice in the lines of every key
/// its alias lines point at, in place and in order.
///
/// A link back to a key already being resolved, or one past
/// [`MAX_ALIAS_DEPTH`], is skipped and contributes no lines.
pub fn resolve_fact(db: &FactoidDb, key: &str, groups: &[&str]) -> Result<Vec<String>> {
    let mut path = Vec::new();
    let mut out = Vec::new();
    resolve_into(db, key, groups, &mut path, &mut out)?;
    Ok(out)
}

fn resolve_into(
    db: &FactoidDb,
    key: &str,
    groups: &[&str],
    path: &mut Vec<String>,
    out: &mut Vec<String>,
) -> Result<()> {
    let canonical = db.canonical_key(key);
    if path.contains(&canonical) {
        warn!(key, chain = ?path, "alias cycle, link not followed");
        return Ok(());
    }
    if path.len() >= MAX_ALIAS_DEPTH {
        warn!(key, depth = path.len(), "alias chain too deep, link not followed");
        return Ok(());
    }

    path.push(canonical);
    for line in db.get_fact(key, groups)? {
        match alias_target(&line) {
            Some(target) => resolve_into(db, target, groups, path, out)?,
            None => out.push(line),
        }
    }
    path.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreOptions;

    fn mem_db() -> FactoidDb {
        FactoidDb::open_in_memory(StoreOptions::default()).unwrap()
    }

    #[test]
    fn alias_target_parsing() {
        assert_eq!(alias_target("=P.3"), Some("P.3"));
        assert_eq!(alias_target("=  P.3 "), Some("P.3"));
        assert_eq!(alias_target("="), None);
        assert_eq!(alias_target("P.3 = x"), None);
    }

    #[test]
    fn alias_round_trip() {
        let db = mem_db();
        db.add_fact("a", "=b", &[]).unwrap();
        db.add_fact("b", "hello", &[]).unwrap();
        assert_eq!(resolve_fact(&db, "a", &[]).unwrap(), vec!["hello"]);
    }

    #[test]
    fn expansions_are_spliced_in_place() {
        let db = mem_db();
        db.add_fact("a", "before", &[]).unwrap();
        db.add_fact("a", "= B", &[]).unwrap();
        db.add_fact("a", "after", &[]).unwrap();
        db.add_fact("b", "b1", &[]).unwrap();
        db.add_fact("b", "b2", &[]).unwrap();

        assert_eq!(
            resolve_fact(&db, "a", &[]).unwrap(),
            vec!["before", "b1", "b2", "after"]
        );
        // get_fact itself never expands.
        assert_eq!(db.get_fact("a", &[]).unwrap()[1], "= B");
    }

    #[test]
    fn group_filter_applies_to_alias_targets() {
        let db = mem_db();
        db.add_fact("a", "=b", &["public"]).unwrap();
        db.add_fact("b", "secret", &["private"]).unwrap();

        assert!(resolve_fact(&db, "a", &["public"]).unwrap().is_empty());
        assert_eq!(
            resolve_fact(&db, "a", &["public", "private"]).unwrap(),
            vec!["secret"]
        );
    }

    #[test]
    fn cycles_terminate() {
        let db = mem_db();
        db.add_fact("a", "=b", &[]).unwrap();
        db.add_fact("a", "from a", &[]).unwrap();
        db.add_fact("b", "=a", &[]).unwrap();
        db.add_fact("b", "from b", &[]).unwrap();
        db.add_fact("self", "=SELF", &[]).unwrap();

        assert_eq!(
            resolve_fact(&db, "a", &[]).unwrap(),
            vec!["from b", "from a"]
        );
        assert!(resolve_fact(&db, "self", &[]).unwrap().is_empty());
    }

    #[test]
    fn diamond_aliases_expand_twice() {
        let db = mem_db();
        db.add_fact("top", "=leaf", &[]).unwrap();
        db.add_fact("top", "=leaf", &[]).unwrap();
        db.add_fact("leaf", "x", &[]).unwrap();
        assert_eq!(resolve_fact(&db, "top", &[]).unwrap(), vec!["x", "x"]);
    }

    #[test]
    fn long_chains_are_cut_at_max_depth() {
        let db = mem_db();
        let total = MAX_ALIAS_DEPTH + 4;
        for i in 0..total {
            db.add_fact(&format!("k{i}"), &format!("=k{}", i + 1), &[])
                .unwrap();
        }
        db.add_fact(&format!("k{total}"), "end", &[]).unwrap();
        assert!(resolve_fact(&db, "k0", &[]).unwrap().is_empty());

        // A chain within the limit resolves.
        assert_eq!(
            resolve_fact(&db, &format!("k{}", total - 3), &[]).unwrap(),
            vec!["end"]
        );
    }
}
