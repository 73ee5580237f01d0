//! Revision graph over the scripts in the versions directory, and upgrade/downgrade planning.

use crate::error::AppError;
use crate::migration::revision::RevisionScript;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct RevisionGraph {
    revisions: BTreeMap<String, RevisionScript>,
    /// Parent-first order of every revision.
    order: Vec<String>,
}

fn migration_err(msg: impl Into<String>) -> AppError {
    AppError::Migration(msg.into())
}

impl RevisionGraph {
    /// Loads every `.sql` file in `dir`. A missing directory is an empty graph.
    pub async fn load(dir: &Path) -> Result<Self, AppError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let mut scripts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let text = tokio::fs::read_to_string(&path).await?;
            scripts.push(RevisionScript::parse(&path, &text)?);
        }
        Self::from_scripts(scripts)
    }

    pub fn from_scripts(scripts: Vec<RevisionScript>) -> Result<Self, AppError> {
        let mut revisions = BTreeMap::new();
        for script in scripts {
            if let Some(dup) = revisions.insert(script.id.clone(), script) {
                return Err(migration_err(format!("duplicate revision id {}", dup.id)));
            }
        }
        for rev in revisions.values() {
            for parent in &rev.parents {
                if !revisions.contains_key(parent) {
                    return Err(migration_err(format!(
                        "revision {} refers to unknown parent {}",
                        rev.id, parent
                    )));
                }
            }
        }

        // Kahn's algorithm; ties broken by id so the order is stable.
        let mut pending: BTreeMap<&str, usize> = revisions
            .values()
            .map(|r| (r.id.as_str(), r.parents.len()))
            .collect();
        let mut ready: VecDeque<&str> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(revisions.len());
        while let Some(id) = ready.pop_front() {
            order.push(id.to_string());
            for child in revisions.values().filter(|r| r.parents.iter().any(|p| p == id)) {
                if let Some(n) = pending.get_mut(child.id.as_str()) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push_back(child.id.as_str());
                    }
                }
            }
        }
        if order.len() != revisions.len() {
            return Err(migration_err("revision graph contains a cycle"));
        }

        Ok(Self { revisions, order })
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RevisionScript> {
        self.revisions.get(id)
    }

    /// Revisions no other revision names as a parent.
    pub fn heads(&self) -> Vec<String> {
        let parents: BTreeSet<&str> = self
            .revisions
            .values()
            .flat_map(|r| r.parents.iter().map(String::as_str))
            .collect();
        self.revisions
            .keys()
            .filter(|id| !parents.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Children before parents, starting from the heads.
    pub fn walk(&self) -> impl Iterator<Item = &RevisionScript> {
        self.order.iter().rev().filter_map(|id| self.revisions.get(id))
    }

    /// Exact id, or a unique id prefix.
    pub fn resolve(&self, reference: &str) -> Result<&RevisionScript, AppError> {
        if let Some(rev) = self.revisions.get(reference) {
            return Ok(rev);
        }
        let mut candidates = self
            .revisions
            .range(reference.to_string()..)
            .take_while(|(id, _)| id.starts_with(reference));
        match (candidates.next(), candidates.next()) {
            (Some((_, rev)), None) if !reference.is_empty() => Ok(rev),
            (Some(_), Some(_)) => Err(migration_err(format!(
                "Multiple revisions start with '{}'",
                reference
            ))),
            _ => Err(migration_err(format!(
                "Can't locate revision identified by '{}'",
                reference
            ))),
        }
    }

    /// The revision and all its ancestors.
    pub fn ancestors(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(cur) = stack.pop() {
            if !seen.insert(cur.clone()) {
                continue;
            }
            if let Some(rev) = self.revisions.get(&cur) {
                stack.extend(rev.parents.iter().cloned());
            }
        }
        seen
    }

    fn closure<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
        ids.into_iter().flat_map(|id| self.ancestors(id)).collect()
    }

    fn children(&self, id: &str) -> Vec<&str> {
        self.revisions
            .values()
            .filter(|r| r.parents.iter().any(|p| p == id))
            .map(|r| r.id.as_str())
            .collect()
    }

    fn roots(&self) -> Vec<&str> {
        self.revisions
            .values()
            .filter(|r| r.parents.is_empty())
            .map(|r| r.id.as_str())
            .collect()
    }

    /// Members of `applied` that are not a parent of another member.
    pub fn heads_of(&self, applied: &BTreeSet<String>) -> Vec<String> {
        applied
            .iter()
            .filter(|id| {
                !applied.iter().any(|other| {
                    self.revisions
                        .get(other)
                        .is_some_and(|r| r.parents.iter().any(|p| p == *id))
                })
            })
            .cloned()
            .collect()
    }

    fn single_current<'a>(&self, current: &'a [String]) -> Result<Option<&'a str>, AppError> {
        match current {
            [] => Ok(None),
            [one] => Ok(Some(one.as_str())),
            _ => Err(migration_err(
                "Ambiguous relative step: the database has multiple current revisions",
            )),
        }
    }

    /// Revisions to apply, parent-first, to reach `target` from `current`.
    pub fn plan_upgrade(&self, current: &[String], target: &str) -> Result<Vec<String>, AppError> {
        let applied = self.closure(current);
        let targets: Vec<String> = match target {
            "head" => match self.heads().as_slice() {
                [] => Vec::new(),
                [one] => vec![one.clone()],
                _ => {
                    return Err(migration_err(
                        "Multiple head revisions are present; please specify the target revision",
                    ))
                }
            },
            "heads" => self.heads(),
            step if step.starts_with('+') => {
                let n = parse_steps(step)?;
                let mut cur = self.single_current(current)?;
                for _ in 0..n {
                    let next = match cur {
                        Some(id) => self.children(id),
                        None => self.roots(),
                    };
                    cur = match next.as_slice() {
                        [one] => Some(*one),
                        [] => {
                            return Err(migration_err(format!(
                                "Relative revision {} didn't produce {} migrations",
                                step, n
                            )))
                        }
                        _ => return Err(migration_err("Ambiguous relative step: revision has multiple children")),
                    };
                }
                cur.map(|id| vec![id.to_string()]).unwrap_or_default()
            }
            reference => vec![self.resolve(reference)?.id.clone()],
        };

        let wanted = self.closure(&targets);
        Ok(self
            .order
            .iter()
            .filter(|id| wanted.contains(*id) && !applied.contains(*id))
            .cloned()
            .collect())
    }

    /// Revisions to revert, child-first, to step back to `target` from `current`.
    pub fn plan_downgrade(&self, current: &[String], target: &str) -> Result<Vec<String>, AppError> {
        let applied = self.closure(current);
        let keep: BTreeSet<String> = match target {
            "base" => BTreeSet::new(),
            step if step.starts_with('-') => {
                let n = parse_steps(step)?;
                let mut cur = self.single_current(current)?;
                for _ in 0..n {
                    let id = cur.ok_or_else(|| {
                        migration_err(format!(
                            "Relative revision {} didn't produce {} migrations",
                            step, n
                        ))
                    })?;
                    let rev = self
                        .get(id)
                        .ok_or_else(|| migration_err(format!("unknown revision {}", id)))?;
                    cur = match rev.parents.as_slice() {
                        [] => None,
                        [one] => Some(one.as_str()),
                        _ => return Err(migration_err("Ambiguous relative step: revision is a merge point")),
                    };
                }
                cur.map(|id| self.ancestors(id)).unwrap_or_default()
            }
            reference => {
                let rev = self.resolve(reference)?;
                if !applied.contains(&rev.id) {
                    return Err(migration_err(format!(
                        "Revision {} is not an ancestor of the current revision",
                        rev.id
                    )));
                }
                self.ancestors(&rev.id)
            }
        };

        Ok(self
            .order
            .iter()
            .rev()
            .filter(|id| applied.contains(*id) && !keep.contains(*id))
            .cloned()
            .collect())
    }
}

fn parse_steps(step: &str) -> Result<usize, AppError> {
    step[1..]
        .parse::<usize>()
        .map_err(|_| migration_err(format!("Invalid relative revision '{}'", step)))
}
