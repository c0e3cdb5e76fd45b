//! Per-entity tallies of a run. Workers bump counters concurrently; the
//! snapshot is logged once at the end.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    User,
    Project,
    Board,
    BoardMember,
    List,
    Card,
    CardMember,
    CardLabel,
    Tasklist,
    Task,
    Comment,
    Attachment,
}

impl EntityKind {
    pub const COUNT: usize = 12;

    pub const ALL: [EntityKind; Self::COUNT] = [
        EntityKind::User,
        EntityKind::Project,
        EntityKind::Board,
        EntityKind::BoardMember,
        EntityKind::List,
        EntityKind::Card,
        EntityKind::CardMember,
        EntityKind::CardLabel,
        EntityKind::Tasklist,
        EntityKind::Task,
        EntityKind::Comment,
        EntityKind::Attachment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Project => "project",
            EntityKind::Board => "board",
            EntityKind::BoardMember => "board_member",
            EntityKind::List => "list",
            EntityKind::Card => "card",
            EntityKind::CardMember => "card_member",
            EntityKind::CardLabel => "card_label",
            EntityKind::Tasklist => "tasklist",
            EntityKind::Task => "task",
            EntityKind::Comment => "comment",
            EntityKind::Attachment => "attachment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Reused,
    Skipped,
    Failed,
}

#[derive(Debug, Default)]
struct Tally {
    created: AtomicUsize,
    reused: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    tallies: [Tally; EntityKind::COUNT],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub created: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MigrationReport {
    pub fn record(&self, kind: EntityKind, outcome: Outcome) {
        let tally = &self.tallies[kind as usize];
        let counter = match outcome {
            Outcome::Created => &tally.created,
            Outcome::Reused => &tally.reused,
            Outcome::Skipped => &tally.skipped,
            Outcome::Failed => &tally.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self, kind: EntityKind) -> Counts {
        let tally = &self.tallies[kind as usize];
        Counts {
            created: tally.created.load(Ordering::Relaxed),
            reused: tally.reused.load(Ordering::Relaxed),
            skipped: tally.skipped.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed),
        }
    }

    pub fn total_failed(&self) -> usize {
        EntityKind::ALL.iter().map(|k| self.counts(*k).failed).sum()
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, Counts> {
        EntityKind::ALL
            .iter()
            .map(|k| (k.as_str(), self.counts(*k)))
            .collect()
    }
}
