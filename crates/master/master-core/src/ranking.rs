//! Final standings.

use chomp_state::AgentRecord;
use std::cmp::Ordering;

/// One line of the final ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub slot: usize,
    pub name: String,
    pub pid: i32,
    pub score: u32,
    pub valid_moves: u32,
    pub invalid_moves: u32,
    pub blocked: bool,
}

impl Standing {
    pub fn from_record(slot: usize, record: &AgentRecord) -> Self {
        Self {
            slot,
            name: record.name().to_owned(),
            pid: record.pid,
            score: record.score,
            valid_moves: record.valid_moves,
            invalid_moves: record.invalid_moves,
            blocked: record.is_blocked(),
        }
    }
}

/// Best first: higher score, then more valid moves, then fewer invalid
/// moves, then lower pid.
pub fn compare(a: &Standing, b: &Standing) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(b.valid_moves.cmp(&a.valid_moves))
        .then(a.invalid_moves.cmp(&b.invalid_moves))
        .then(a.pid.cmp(&b.pid))
}

/// Rank every record, slot order preserved in [`Standing::slot`].
pub fn rank(agents: &[AgentRecord]) -> Vec<Standing> {
    let mut standings: Vec<_> = agents
        .iter()
        .enumerate()
        .map(|(slot, record)| Standing::from_record(slot, record))
        .collect();
    standings.sort_by(compare);
    standings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: i32, score: u32, valid: u32, invalid: u32) -> AgentRecord {
        let mut record = AgentRecord::default();
        record.pid = pid;
        record.score = score;
        record.valid_moves = valid;
        record.invalid_moves = invalid;
        record
    }

    fn pids(agents: &[AgentRecord]) -> Vec<i32> {
        rank(agents).iter().map(|s| s.pid).collect()
    }

    #[test]
    fn score_decides_first() {
        assert_eq!(pids(&[record(1, 10, 9, 0), record(2, 30, 1, 5)]), [2, 1]);
    }

    #[test]
    fn tie_on_score_goes_to_more_valid_moves() {
        assert_eq!(pids(&[record(1, 20, 3, 0), record(2, 20, 4, 9)]), [2, 1]);
    }

    #[test]
    fn then_fewer_invalid_moves() {
        assert_eq!(pids(&[record(1, 20, 4, 2), record(2, 20, 4, 1)]), [2, 1]);
    }

    #[test]
    fn then_lower_pid() {
        assert_eq!(
            pids(&[record(30, 20, 4, 1), record(10, 20, 4, 1), record(20, 20, 4, 1)]),
            [10, 20, 30]
        );
    }

    #[test]
    fn standing_keeps_slot_and_flags() {
        let mut blocked = record(7, 3, 1, 0);
        blocked.set_blocked();
        blocked.set_name("chomper");

        let ranked = rank(&[record(5, 9, 2, 0), blocked]);
        assert_eq!(ranked[1].slot, 1);
        assert_eq!(ranked[1].name, "chomper");
        assert!(ranked[1].blocked);
        assert!(!ranked[0].blocked);
    }
}
