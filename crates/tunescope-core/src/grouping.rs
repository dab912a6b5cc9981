//! Event Grouping
//!
//! Clusters per-sample detections into discrete events. Every analyzer
//! classifies samples first, then hands its candidates to
//! [`group_by_window`], which keeps one open group per kind and closes it
//! when the next same-kind candidate arrives more than `window` seconds
//! after the group's last member.

/// Slack applied to window and duration comparisons so that decimal
/// timestamps (e.g. 1.1 - 1.0) still compare as exact.
pub const TIME_TOLERANCE: f64 = 1e-9;

/// A classified sample that can be folded into an event
pub trait Candidate {
    /// Classification tag; only candidates of the same kind merge
    type Kind: Copy + PartialEq;

    /// Sample time in seconds
    fn time(&self) -> f64;

    /// Classification of this sample
    fn kind(&self) -> Self::Kind;
}

/// One or more same-kind candidates close together in time
#[derive(Debug, Clone)]
pub struct Group<T> {
    members: Vec<T>,
}

impl<T: Candidate> Group<T> {
    fn new(first: T) -> Self {
        Self {
            members: vec![first],
        }
    }

    /// Kind shared by every member
    pub fn kind(&self) -> T::Kind {
        self.members[0].kind()
    }

    /// Time of the first member
    pub fn start(&self) -> f64 {
        self.members[0].time()
    }

    /// Time of the last member
    pub fn end(&self) -> f64 {
        self.members[self.members.len() - 1].time()
    }

    /// `end - start`
    pub fn duration(&self) -> f64 {
        self.end() - self.start()
    }

    /// Number of folded samples
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Groups always hold at least one member
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// All members in time order
    pub fn members(&self) -> &[T] {
        &self.members
    }

    /// Earliest member
    pub fn first(&self) -> &T {
        &self.members[0]
    }

    /// Arithmetic mean of a member field
    pub fn mean(&self, f: impl Fn(&T) -> f64) -> f64 {
        self.members.iter().map(&f).sum::<f64>() / self.members.len() as f64
    }

    /// Largest value of a member field
    pub fn max(&self, f: impl Fn(&T) -> f64) -> f64 {
        self.members.iter().map(&f).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest value of a member field
    pub fn min(&self, f: impl Fn(&T) -> f64) -> f64 {
        self.members.iter().map(&f).fold(f64::INFINITY, f64::min)
    }

    /// Member with the greatest score; the earliest wins ties
    pub fn peak_by(&self, score: impl Fn(&T) -> f64) -> &T {
        let mut best = &self.members[0];
        let mut best_score = score(best);
        for member in &self.members[1..] {
            let s = score(member);
            if s > best_score {
                best = member;
                best_score = s;
            }
        }
        best
    }

    /// Whether any member satisfies a predicate
    pub fn any(&self, f: impl Fn(&T) -> bool) -> bool {
        self.members.iter().any(f)
    }

    /// Number of members satisfying a predicate
    pub fn count(&self, f: impl Fn(&T) -> bool) -> usize {
        self.members.iter().filter(|m| f(*m)).count()
    }
}

/// Group candidates per kind with an inclusive time window
///
/// Candidates are ordered by time first (stable), so callers may pass them
/// in scan order. Output groups are ordered by start time; groups that start
/// together keep the order in which they were opened.
pub fn group_by_window<T: Candidate>(mut candidates: Vec<T>, window: f64) -> Vec<Group<T>> {
    candidates.sort_by(|a, b| a.time().total_cmp(&b.time()));

    let window = window.max(0.0);
    let mut open: Vec<(usize, Group<T>)> = Vec::new();
    let mut closed: Vec<(usize, Group<T>)> = Vec::new();
    let mut next_seq = 0usize;

    for candidate in candidates {
        let kind = candidate.kind();
        match open.iter().position(|(_, g)| g.kind() == kind) {
            Some(pos) => {
                let gap = candidate.time() - open[pos].1.end();
                if gap <= window + TIME_TOLERANCE {
                    open[pos].1.members.push(candidate);
                } else {
                    let finished = std::mem::replace(&mut open[pos], (next_seq, Group::new(candidate)));
                    next_seq += 1;
                    closed.push(finished);
                }
            }
            None => {
                open.push((next_seq, Group::new(candidate)));
                next_seq += 1;
            }
        }
    }

    closed.extend(open);
    closed.sort_by(|(sa, a), (sb, b)| a.start().total_cmp(&b.start()).then(sa.cmp(sb)));
    closed.into_iter().map(|(_, g)| g).collect()
}

/// Drop groups shorter than the minimum duration for their kind
///
/// `min_duration` returns `None` for kinds that are exempt.
pub fn retain_min_duration<T: Candidate>(
    groups: &mut Vec<Group<T>>,
    min_duration: impl Fn(T::Kind) -> Option<f64>,
) {
    groups.retain(|g| match min_duration(g.kind()) {
        Some(min) => g.duration() + TIME_TOLERANCE >= min,
        None => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Kind {
        High,
        Low,
    }

    #[derive(Debug, Clone)]
    struct Hit {
        time: f64,
        kind: Kind,
        value: f64,
    }

    impl Candidate for Hit {
        type Kind = Kind;
        fn time(&self) -> f64 {
            self.time
        }
        fn kind(&self) -> Kind {
            self.kind
        }
    }

    fn hit(time: f64, kind: Kind, value: f64) -> Hit {
        Hit { time, kind, value }
    }

    #[test]
    fn test_window_boundary() {
        let merged = group_by_window(vec![hit(1.0, Kind::High, 1.0), hit(1.1, Kind::High, 2.0)], 0.1);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 2);

        let split = group_by_window(
            vec![hit(1.0, Kind::High, 1.0), hit(1.1 + 1e-6, Kind::High, 2.0)],
            0.1,
        );
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn test_chaining_uses_last_member() {
        let hits = (0..10).map(|i| hit(i as f64 * 0.08, Kind::High, 0.0)).collect();
        let groups = group_by_window(hits, 0.1);
        assert_eq!(groups.len(), 1);
        assert!((groups[0].duration() - 0.72).abs() < 1e-9);
    }

    #[test]
    fn test_kinds_group_independently() {
        let hits = vec![
            hit(0.0, Kind::High, 1.0),
            hit(0.05, Kind::Low, 1.0),
            hit(0.1, Kind::High, 3.0),
            hit(0.5, Kind::Low, 1.0),
        ];
        let groups = group_by_window(hits, 0.2);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].kind(), Kind::High);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].kind(), Kind::Low);
        assert_eq!(groups[2].start(), 0.5);
    }

    #[test]
    fn test_group_aggregates() {
        let hits = vec![
            hit(0.0, Kind::High, 1.0),
            hit(0.1, Kind::High, 5.0),
            hit(0.2, Kind::High, 5.0),
        ];
        let groups = group_by_window(hits, 0.5);
        let g = &groups[0];
        assert!((g.mean(|h| h.value) - 11.0 / 3.0).abs() < 1e-9);
        assert_eq!(g.peak_by(|h| h.value).time, 0.1);
        assert_eq!(g.max(|h| h.value), 5.0);
        assert_eq!(g.min(|h| h.value), 1.0);
        assert_eq!(g.count(|h| h.value > 2.0), 2);
    }

    #[test]
    fn test_min_duration_filter() {
        let hits = vec![
            hit(0.0, Kind::High, 0.0),
            hit(0.3, Kind::High, 0.0),
            hit(5.0, Kind::High, 0.0),
            hit(9.0, Kind::Low, 0.0),
        ];
        let mut groups = group_by_window(hits, 0.5);
        retain_min_duration(&mut groups, |kind| match kind {
            Kind::High => Some(0.3),
            Kind::Low => None,
        });
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].start(), 0.0);
        assert_eq!(groups[1].kind(), Kind::Low);
    }
}
