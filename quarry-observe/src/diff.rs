//! The two-level result-set diff.
//!
//! Compares two ordered, sectioned snapshots by record identity and produces
//! the minimal batch of section/row operations that transforms old into new:
//!
//! - a section present on only one side is a section insert or delete, and
//!   covers its own rows
//! - a record present on both sides whose position changed is a move, never
//!   a delete plus insert
//! - a record at the same position whose version changed is an update
//! - a record whose old section disappeared but which lands in a surviving
//!   section is an insert there (and symmetrically a delete)

use crate::{ChangeBatch, RowPath};
use quarry_types::RecordId;
use std::collections::{HashMap, HashSet};

/// One row as the observer last saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowKey {
    pub(crate) id: RecordId,
    pub(crate) version: i64,
}

/// One section of an observed result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SectionSnapshot {
    pub(crate) title: String,
    pub(crate) rows: Vec<RowKey>,
}

pub(crate) fn diff(old: &[SectionSnapshot], new: &[SectionSnapshot]) -> ChangeBatch {
    let old_titles: HashMap<&str, usize> = old
        .iter()
        .enumerate()
        .map(|(i, s)| (s.title.as_str(), i))
        .collect();
    let new_titles: HashMap<&str, usize> = new
        .iter()
        .enumerate()
        .map(|(i, s)| (s.title.as_str(), i))
        .collect();

    let mut batch = ChangeBatch::default();
    for (i, section) in old.iter().enumerate() {
        if !new_titles.contains_key(section.title.as_str()) {
            batch.deleted_sections.push(i);
        }
    }
    for (i, section) in new.iter().enumerate() {
        if !old_titles.contains_key(section.title.as_str()) {
            batch.inserted_sections.push(i);
        }
    }

    let mut old_pos: HashMap<RecordId, (usize, usize, i64)> = HashMap::new();
    for (si, section) in old.iter().enumerate() {
        for (ri, row) in section.rows.iter().enumerate() {
            old_pos.insert(row.id, (si, ri, row.version));
        }
    }
    let mut new_ids: HashSet<RecordId> = HashSet::new();

    for (si, section) in new.iter().enumerate() {
        let new_section_persists = old_titles.contains_key(section.title.as_str());
        for (ri, row) in section.rows.iter().enumerate() {
            new_ids.insert(row.id);
            match old_pos.get(&row.id) {
                Some(&(old_si, old_ri, old_version)) => {
                    let old_section_persists =
                        new_titles.contains_key(old[old_si].title.as_str());
                    match (old_section_persists, new_section_persists) {
                        (true, true) => {
                            if (old_si, old_ri) != (si, ri) {
                                batch
                                    .moved_rows
                                    .push((RowPath::new(old_si, old_ri), RowPath::new(si, ri)));
                            } else if old_version != row.version {
                                batch.updated_rows.push(RowPath::new(si, ri));
                            }
                        }
                        // Old home vanished; surfaces as an insert here.
                        (false, true) => batch.inserted_rows.push(RowPath::new(si, ri)),
                        // New home is a fresh section; the old row goes away.
                        (true, false) => {
                            batch.deleted_rows.push(RowPath::new(old_si, old_ri));
                        }
                        (false, false) => {}
                    }
                }
                None => {
                    if new_section_persists {
                        batch.inserted_rows.push(RowPath::new(si, ri));
                    }
                }
            }
        }
    }

    for (si, section) in old.iter().enumerate() {
        if !new_titles.contains_key(section.title.as_str()) {
            continue;
        }
        for (ri, row) in section.rows.iter().enumerate() {
            if !new_ids.contains(&row.id) {
                batch.deleted_rows.push(RowPath::new(si, ri));
            }
        }
    }

    batch.inserted_sections.sort_unstable();
    batch.deleted_sections.sort_unstable();
    batch.inserted_rows.sort_unstable();
    batch.deleted_rows.sort_unstable();
    batch.updated_rows.sort_unstable();
    batch.moved_rows.sort_unstable();
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(title: &str, rows: &[(RecordId, i64)]) -> SectionSnapshot {
        SectionSnapshot {
            title: title.to_string(),
            rows: rows
                .iter()
                .map(|&(id, version)| RowKey { id, version })
                .collect(),
        }
    }

    #[test]
    fn identical_snapshots_diff_to_empty() {
        let a = RecordId::new();
        let b = RecordId::new();
        let old = vec![section("", &[(a, 1), (b, 1)])];
        assert!(diff(&old, &old).is_empty());
    }

    #[test]
    fn swap_is_two_moves_not_delete_insert() {
        let a = RecordId::new();
        let b = RecordId::new();
        let old = vec![section("", &[(a, 1), (b, 1)])];
        let new = vec![section("", &[(b, 2), (a, 2)])];
        let batch = diff(&old, &new);
        assert!(batch.inserted_rows.is_empty());
        assert!(batch.deleted_rows.is_empty());
        assert_eq!(batch.moved_rows.len(), 2);
        assert!(batch
            .moved_rows
            .contains(&(RowPath::new(0, 0), RowPath::new(0, 1))));
        assert!(batch
            .moved_rows
            .contains(&(RowPath::new(0, 1), RowPath::new(0, 0))));
    }

    #[test]
    fn version_bump_in_place_is_update() {
        let a = RecordId::new();
        let old = vec![section("", &[(a, 1)])];
        let new = vec![section("", &[(a, 2)])];
        let batch = diff(&old, &new);
        assert_eq!(batch.updated_rows, vec![RowPath::new(0, 0)]);
        assert!(batch.moved_rows.is_empty());
    }

    #[test]
    fn new_section_covers_its_rows() {
        let a = RecordId::new();
        let b = RecordId::new();
        let old = vec![section("active", &[(a, 1)])];
        let new = vec![
            section("active", &[(a, 1)]),
            section("done", &[(b, 1)]),
        ];
        let batch = diff(&old, &new);
        assert_eq!(batch.inserted_sections, vec![1]);
        assert!(batch.inserted_rows.is_empty());
    }

    #[test]
    fn row_crossing_into_surviving_section_moves() {
        let a = RecordId::new();
        let b = RecordId::new();
        let old = vec![
            section("active", &[(a, 1), (b, 1)]),
            section("done", &[]),
        ];
        let new = vec![
            section("active", &[(a, 1)]),
            section("done", &[(b, 2)]),
        ];
        let batch = diff(&old, &new);
        assert_eq!(
            batch.moved_rows,
            vec![(RowPath::new(0, 1), RowPath::new(1, 0))]
        );
        assert!(batch.deleted_rows.is_empty());
        assert!(batch.inserted_rows.is_empty());
    }

    #[test]
    fn section_removal_covers_rows_and_surviving_section_gets_insert() {
        let a = RecordId::new();
        let b = RecordId::new();
        let old = vec![
            section("active", &[(a, 1)]),
            section("done", &[(b, 1)]),
        ];
        // "done" disappears; b resurfaces under "active".
        let new = vec![section("active", &[(a, 1), (b, 2)])];
        let batch = diff(&old, &new);
        assert_eq!(batch.deleted_sections, vec![1]);
        assert_eq!(batch.inserted_rows, vec![RowPath::new(0, 1)]);
        assert!(batch.deleted_rows.is_empty());
    }

    #[test]
    fn plain_delete_reports_old_path() {
        let a = RecordId::new();
        let b = RecordId::new();
        let old = vec![section("", &[(a, 1), (b, 1)])];
        let new = vec![section("", &[(b, 1)])];
        let batch = diff(&old, &new);
        assert_eq!(batch.deleted_rows, vec![RowPath::new(0, 0)]);
        // b shifts from row 1 to row 0, which reads as a move.
        assert_eq!(
            batch.moved_rows,
            vec![(RowPath::new(0, 1), RowPath::new(0, 0))]
        );
    }
}
