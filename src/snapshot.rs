use {
    crate::{
        command::CommandNamer,
        process::{Process, ProcessKey, RawProcess},
    },
    std::{collections::HashMap, time::Instant},
};

/// every live process at one moment in time.
///
/// snapshots are immutable once built. parent links are stored as [`ProcessKey`]s and
/// resolved against this snapshot's index.
#[derive(Clone, Debug)]
pub struct Snapshot {
    processes: Vec<Process>,
    by_pid: HashMap<u32, usize>,
    time: Instant,
}

// === impl Snapshot ===

impl Snapshot {
    /// builds a snapshot from a process source's rows, resolving parent links.
    pub fn new(rows: Vec<RawProcess>, namer: &dyn CommandNamer, time: Instant) -> Self {
        let mut processes = rows
            .into_iter()
            .map(|row| Process::new(row, namer))
            .collect::<Vec<_>>();
        let by_pid = index(&processes);

        let parents = processes
            .iter()
            .map(|p| Self::resolve_parent(p, &processes, &by_pid))
            .collect::<Vec<_>>();
        for (process, parent) in processes.iter_mut().zip(parents) {
            process.set_parent(parent);
        }

        Self {
            processes,
            by_pid,
            time,
        }
    }

    /// builds a snapshot from processes whose parent links are already resolved.
    pub(crate) fn from_processes(processes: Vec<Process>, time: Instant) -> Self {
        let by_pid = index(&processes);
        Self {
            processes,
            by_pid,
            time,
        }
    }

    fn resolve_parent(
        child: &Process,
        processes: &[Process],
        by_pid: &HashMap<u32, usize>,
    ) -> Option<ProcessKey> {
        let ppid = child.ppid().filter(|ppid| *ppid != child.pid())?;
        let parent = &processes[*by_pid.get(&ppid)?];

        // a parent younger than its child means the parent pid has been recycled.
        (parent.start_time() <= child.start_time()).then(|| parent.key())
    }

    pub fn time(&self) -> Instant {
        self.time
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn into_processes(self) -> Vec<Process> {
        self.processes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Process> {
        self.processes.iter()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn get(&self, pid: u32) -> Option<&Process> {
        self.by_pid.get(&pid).map(|i| &self.processes[*i])
    }

    /// looks up a process by pid, only if it is the same process instance as `key`.
    pub fn resolve(&self, key: ProcessKey) -> Option<&Process> {
        self.get(key.pid).filter(|p| p.start_time() == key.start_time)
    }

    /// the command names of `process` and its ancestors, root first.
    pub fn call_chain(&self, process: &Process) -> Vec<String> {
        let mut chain = vec![process.command().to_string()];

        let mut next = process.parent();
        while let Some(key) = next {
            // parent links cannot form a cycle through start times alone, but equal start
            // times could. a chain can never be longer than the snapshot.
            if chain.len() > self.processes.len() {
                break;
            }
            let Some(parent) = self.resolve(key) else {
                break;
            };
            chain.push(parent.command().to_string());
            next = parent.parent();
        }

        chain.reverse();
        chain
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Process;
    type IntoIter = std::slice::Iter<'a, Process>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn index(processes: &[Process]) -> HashMap<u32, usize> {
    let mut by_pid = HashMap::with_capacity(processes.len());
    for (i, process) in processes.iter().enumerate() {
        by_pid.entry(process.pid()).or_insert(i);
    }
    by_pid
}
