//! File de travail producteur/consommateur à worker unique.
//!
//! Utilisée par l'annuaire de découverte (tâches alive/byebye) et par la
//! sauvegarde du cache de métadonnées (mode « coalescent » : une nouvelle tâche
//! remplace celles qui attendent encore).
//!
//! Arrêt : [`WorkQueue::set_terminate_and_wait`] refuse les nouveaux dépôts,
//! réveille tous les threads bloqués, laisse le worker vider la file puis
//! attend sa fin.

use std::collections::VecDeque;
use std::io;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

struct QueueState<T> {
    queue: VecDeque<T>,
    terminate: bool,
    busy: bool,
}

pub struct WorkQueue<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    /// Producteurs et attentes d'inactivité
    client_cond: Condvar,
    /// Worker en attente de tâche
    worker_cond: Condvar,
    high_water: usize,
    flush_on_put: bool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Remet le worker au repos à la fin d'une tâche, panique comprise.
/// Un worker mort termine la file.
struct BusyGuard<'a, T>(&'a WorkQueue<T>);

impl<T> Drop for BusyGuard<'_, T> {
    fn drop(&mut self) {
        self.0.work_done();
    }
}

impl<T> WorkQueue<T> {
    fn work_done(&self) {
        let mut state = self.state.lock();
        state.busy = false;
        if std::thread::panicking() {
            error!(
                "work queue {}: task panicked, dropping {} pending task(s)",
                self.name,
                state.queue.len()
            );
            state.terminate = true;
            state.queue.clear();
        }
        self.client_cond.notify_all();
    }
}

impl<T: Send + 'static> WorkQueue<T> {
    /// File FIFO. `high_water` > 0 bloque `put` quand la file est pleine.
    pub fn new(name: &str, high_water: usize) -> Self {
        Self::build(name, high_water, false)
    }

    /// File où chaque dépôt remplace les tâches en attente.
    pub fn coalescing(name: &str) -> Self {
        Self::build(name, 0, true)
    }

    fn build(name: &str, high_water: usize, flush_on_put: bool) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                terminate: false,
                busy: false,
            }),
            client_cond: Condvar::new(),
            worker_cond: Condvar::new(),
            high_water,
            flush_on_put,
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Démarre le worker sur un thread dédié.
    pub fn start<F>(self: &std::sync::Arc<Self>, mut work: F) -> io::Result<()>
    where
        F: FnMut(T) + Send + 'static,
    {
        let queue = std::sync::Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                while let Some(task) = queue.take() {
                    let _busy = BusyGuard(&*queue);
                    work(task);
                }
                debug!("🛑 work queue {} worker exiting", queue.name);
            })?;
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Dépose une tâche. Retourne `false` si la file est terminée.
    pub fn put(&self, task: T) -> bool {
        let mut state = self.state.lock();
        while !state.terminate && self.high_water > 0 && state.queue.len() >= self.high_water {
            self.client_cond.wait(&mut state);
        }
        if state.terminate {
            debug!("work queue {}: put rejected, terminating", self.name);
            return false;
        }
        if self.flush_on_put && !state.queue.is_empty() {
            debug!(
                "work queue {}: dropping {} superseded task(s)",
                self.name,
                state.queue.len()
            );
            state.queue.clear();
        }
        state.queue.push_back(task);
        self.worker_cond.notify_one();
        true
    }

    /// Prend la prochaine tâche ; `None` quand la file est terminée et vide.
    pub fn take(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.queue.pop_front() {
                state.busy = true;
                self.client_cond.notify_all();
                return Some(task);
            }
            if state.terminate {
                return None;
            }
            self.worker_cond.wait(&mut state);
        }
    }

    /// Attend que la file soit vide et le worker inactif.
    pub fn wait_idle(&self) {
        let mut state = self.state.lock();
        while !state.queue.is_empty() || state.busy {
            self.client_cond.wait(&mut state);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Termine la file et attend la fin du worker.
    pub fn set_terminate_and_wait(&self) {
        {
            let mut state = self.state.lock();
            state.terminate = true;
            self.worker_cond.notify_all();
            self.client_cond.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("work queue {}: worker panicked", self.name);
            }
        }
    }
}
