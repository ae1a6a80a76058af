//! tracks which processes get launched, and by whom, while we watch.

use {
    crate::{process::Process, snapshot::Snapshot},
    std::collections::{BTreeMap, HashMap},
    tracing::trace,
};

/// one coalesced launch line: command names root first, each with its launch count.
pub type LaunchLine = Vec<(String, u32)>;

/// counts launches per call chain.
///
/// the hierarchy only grows for as long as the session lives.
#[derive(Clone, Debug, Default)]
pub struct LaunchCounter {
    hierarchies: BTreeMap<Vec<String>, u32>,
}

// === impl LaunchCounter ===

impl LaunchCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// registers every process in `current` that was not running in `previous`.
    pub fn track(&mut self, previous: &Snapshot, current: &Snapshot) {
        for process in new_launches(previous, current) {
            let chain = current.call_chain(process);
            trace!(pid = process.pid(), chain = %chain.join(" -> "), "new process");
            self.register(chain);
        }
    }

    /// counts one launch of the given call chain.
    pub fn register(&mut self, chain: Vec<String>) {
        if chain.is_empty() {
            return;
        }
        *self.hierarchies.entry(chain).or_insert(0) += 1;
    }

    /// how many times the given call chain has been launched.
    pub fn count(&self, chain: &[String]) -> u32 {
        self.hierarchies.get(chain).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.hierarchies.is_empty()
    }

    /// merges chains that share a prefix into one line per launch path.
    ///
    /// chains are visited in sorted order; a chain that agrees with the previous line on
    /// every position of the shorter of the two is merged into it, summing per-node counts.
    pub fn coalesce(&self) -> Vec<LaunchLine> {
        let mut coalesced: Vec<LaunchLine> = Vec::new();

        for (chain, count) in &self.hierarchies {
            let line = to_line(chain, *count);
            if let Some(last) = coalesced.last_mut() {
                if let Some(merged) = merge(last, &line) {
                    *last = merged;
                    continue;
                }
            }
            coalesced.push(line);
        }

        coalesced
    }

    /// one `a -> b -> c` line per launch path, the most launched first.
    pub fn screen_lines(&self) -> Vec<String> {
        let mut lines = self.coalesce();
        // stable, so equally busy lines stay in sorted order.
        lines.sort_by_key(|line| std::cmp::Reverse(line.iter().map(|(_, n)| *n).max()));

        lines
            .iter()
            .map(|line| {
                line.iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            })
            .collect()
    }
}

/// processes in `current` that were not running in `previous`.
///
/// a pid that is present in both but with different start times has been reused, so the
/// process is new.
pub fn new_launches<'a>(
    previous: &Snapshot,
    current: &'a Snapshot,
) -> impl Iterator<Item = &'a Process> {
    let before = previous
        .iter()
        .map(|p| (p.pid(), p.start_time()))
        .collect::<HashMap<_, _>>();

    current
        .iter()
        .filter(move |p| before.get(&p.pid()) != Some(&p.start_time()))
}

/// `(["a", "b", "c"], 5)` becomes `[("a", 0), ("b", 0), ("c", 5)]`.
fn to_line(chain: &[String], count: u32) -> LaunchLine {
    let last = chain.len().saturating_sub(1);
    chain
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), if i == last { count } else { 0 }))
        .collect()
}

fn merge(a: &LaunchLine, b: &LaunchLine) -> Option<LaunchLine> {
    let (longer, shorter) = if a.len() > b.len() { (a, b) } else { (b, a) };

    let mut merged = longer.clone();
    for (i, (name, count)) in shorter.iter().enumerate() {
        if *name != longer[i].0 {
            return None;
        }
        merged[i].1 += count;
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            command::Heuristic,
            process::{RawProcess, tests::raw},
        },
        std::time::Instant,
    };

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn snapshot(rows: Vec<RawProcess>) -> Snapshot {
        Snapshot::new(rows, &Heuristic, Instant::now())
    }

    #[test]
    fn diverging_chains_stay_apart() {
        let mut counter = LaunchCounter::new();
        counter.register(chain(&["a", "b", "c"]));
        counter.register(chain(&["a", "b", "d"]));

        assert_eq!(counter.screen_lines(), ["a -> b -> c", "a -> b -> d"]);
    }

    #[test]
    fn prefixes_coalesce_into_the_longest_chain() {
        let mut counter = LaunchCounter::new();
        counter.register(chain(&["a", "b"]));
        counter.register(chain(&["a", "b", "c"]));

        assert_eq!(counter.screen_lines(), ["a -> b -> c"]);
        assert_eq!(
            counter.coalesce(),
            [vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("c".to_string(), 1)
            ]]
        );
    }

    #[test]
    fn counts_accumulate() {
        let mut counter = LaunchCounter::new();
        counter.register(chain(&["init", "bash"]));
        counter.register(chain(&["init", "bash"]));
        counter.register(chain(&["init", "sshd"]));
        counter.register(Vec::new());

        assert_eq!(counter.count(&chain(&["init", "bash"])), 2);
        assert_eq!(counter.count(&chain(&["init", "sshd"])), 1);
        assert_eq!(counter.count(&chain(&["init"])), 0);
    }

    #[test]
    fn busiest_lines_first() {
        let mut counter = LaunchCounter::new();
        counter.register(chain(&["init", "cron"]));
        for _ in 0..3 {
            counter.register(chain(&["init", "make", "cc"]));
        }
        counter.register(chain(&["init", "sshd"]));

        assert_eq!(
            counter.screen_lines(),
            ["init -> make -> cc", "init -> cron", "init -> sshd"]
        );
    }

    #[test]
    fn new_launches_include_reused_pids() {
        let previous = snapshot(vec![raw(1, 0, "init"), raw(2, 0, "old")]);
        let current = snapshot(vec![
            raw(1, 0, "init"),
            RawProcess {
                start_time: 1_500_000_000,
                ..raw(2, 0, "recycled")
            },
            raw(3, 0, "fresh"),
        ]);

        let pids = new_launches(&previous, &current)
            .map(|p| p.pid())
            .collect::<Vec<_>>();
        assert_eq!(pids, [2, 3]);
    }

    #[test]
    fn track_registers_call_chains() {
        let previous = snapshot(vec![raw(1, 0, "/sbin/init")]);
        let current = snapshot(vec![
            raw(1, 0, "/sbin/init"),
            RawProcess {
                ppid: Some(1),
                ..raw(2, 0, "/bin/bash")
            },
        ]);

        let mut counter = LaunchCounter::new();
        counter.track(&previous, &current);
        assert_eq!(counter.count(&chain(&["init", "bash"])), 1);
        assert_eq!(counter.screen_lines(), ["init -> bash"]);

        // nothing new the second time around.
        counter.track(&current, &current);
        assert_eq!(counter.count(&chain(&["init", "bash"])), 1);
    }
}
