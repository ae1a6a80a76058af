use crate::snapshot::Snapshot;

/// returns `current`, with cpu times counted from `baseline` rather than from process start.
///
/// processes that are not in the baseline, or whose pid has been reused since, keep all of
/// their cpu time. processes that have exited since the baseline are not included.
pub fn reconcile(baseline: &Snapshot, current: &Snapshot) -> Snapshot {
    let processes = current
        .iter()
        .map(|process| match baseline.get(process.pid()) {
            Some(base) if base.start_time() == process.start_time() => {
                let delta = process.cpu_time().saturating_sub(base.cpu_time());
                process.with_cpu_time(delta)
            }
            _ => process.clone(),
        })
        .collect();

    Snapshot::from_processes(processes, current.time())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            command::Heuristic,
            process::{RawProcess, order_best_last, tests::raw},
        },
        std::time::{Duration, Instant},
    };

    const T1: u64 = 1_270_632_791;
    const T2: u64 = 1_273_224_791;

    fn snapshot(rows: Vec<RawProcess>) -> Snapshot {
        Snapshot::new(rows, &Heuristic, Instant::now())
    }

    fn started(start_time: u64, row: RawProcess) -> RawProcess {
        RawProcess { start_time, ..row }
    }

    fn cpu_of(snapshot: &Snapshot, pid: u32) -> Option<Duration> {
        snapshot.get(pid).map(|p| p.cpu_time())
    }

    #[test]
    fn adjusts_against_the_baseline() {
        let baseline = snapshot(vec![
            started(T1, raw(200, 2_000, "re-used PID baseline")),
            raw(300, 3_000, "relevant baseline"),
            raw(400, 3_000, "only in baseline"),
        ]);
        let current = snapshot(vec![
            raw(100, 10_000, "only in current"),
            started(T2, raw(200, 20_000, "re-used PID baseline")),
            raw(300, 30_000, "relevant baseline"),
        ]);

        let adjusted = reconcile(&baseline, &current);

        assert_eq!(adjusted.len(), 3);
        assert_eq!(cpu_of(&adjusted, 100), Some(Duration::from_secs(10)));
        assert_eq!(cpu_of(&adjusted, 200), Some(Duration::from_secs(20)));
        assert_eq!(cpu_of(&adjusted, 300), Some(Duration::from_secs(27)));
        assert_eq!(cpu_of(&adjusted, 400), None);

        let ordered = order_best_last(adjusted.into_processes());
        let pids = ordered.iter().map(|p| p.pid()).collect::<Vec<_>>();
        assert_eq!(pids, [100, 200, 300]);
    }

    #[test]
    fn same_start_time_subtracts() {
        let baseline = snapshot(vec![started(T1, raw(200, 2_000, "x"))]);
        let current = snapshot(vec![started(T1, raw(200, 20_000, "x"))]);
        let adjusted = reconcile(&baseline, &current);
        assert_eq!(cpu_of(&adjusted, 200), Some(Duration::from_secs(18)));
        assert_eq!(adjusted.get(200).unwrap().cpu_time_s(), "18.0s");
    }

    #[test]
    fn negative_deltas_floor_at_zero() {
        let baseline = snapshot(vec![raw(5, 9_000, "wrapped")]);
        let current = snapshot(vec![raw(5, 1_000, "wrapped")]);
        let adjusted = reconcile(&baseline, &current);
        assert_eq!(cpu_of(&adjusted, 5), Some(Duration::ZERO));
        assert_eq!(adjusted.get(5).unwrap().score(), 1.0);
    }

    #[test]
    fn keeps_order_parents_and_time() {
        let baseline = snapshot(vec![raw(1, 0, "init")]);
        let current = snapshot(vec![
            raw(1, 1_000, "init"),
            RawProcess {
                ppid: Some(1),
                ..raw(2, 500, "child")
            },
        ]);
        let adjusted = reconcile(&baseline, &current);
        assert_eq!(adjusted.time(), current.time());
        assert_eq!(adjusted.processes()[0].pid(), 1);
        assert_eq!(adjusted.get(2).unwrap().parent(), current.get(2).unwrap().parent());
        assert_eq!(adjusted.call_chain(adjusted.get(2).unwrap()), ["init", "child"]);
    }
}
