use super::*;

use std::future::Future;

/// Result of one host in a group run.
#[derive(Debug)]
pub struct HostOutcome<T> {
    /// `user@address:port` of the host.
    pub label: String,
    /// Identifier of the host.
    pub id: String,
    pub result: Result<T, RemoteError>,
}

/// Per-host results of a group run, in group order.
#[derive(Debug)]
pub struct GroupResults<T> {
    outcomes: Vec<HostOutcome<T>>,
}

impl<T> GroupResults<T> {
    /// Result for the host with the given label or id.
    pub fn get(&self, host: &str) -> Option<&Result<T, RemoteError>> {
        self.outcomes
            .iter()
            .find(|o| o.label == host || o.id == host)
            .map(|o| &o.result)
    }

    pub fn failures(&self) -> impl Iterator<Item = &HostOutcome<T>> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn is_all_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HostOutcome<T>> {
        self.outcomes.iter()
    }
}

impl<T> IntoIterator for GroupResults<T> {
    type Item = HostOutcome<T>;
    type IntoIter = std::vec::IntoIter<HostOutcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// An ordered set of hosts that are driven together.
#[derive(Debug, Clone, Default)]
pub struct HostGroup {
    hosts: Vec<Arc<RemoteHost>>,
}

impl HostGroup {
    pub fn new(hosts: impl IntoIterator<Item = RemoteHost>) -> Self {
        Self {
            hosts: hosts.into_iter().map(Arc::new).collect(),
        }
    }

    /// Adds a host that may also be used outside the group.
    pub fn push(&mut self, host: Arc<RemoteHost>) {
        self.hosts.push(host);
    }

    /// Builds one host per spec. The first invalid spec fails the whole group.
    pub fn from_specs<'a>(specs: impl IntoIterator<Item = &'a HostSpec>) -> Result<Self, RemoteError> {
        let hosts = specs
            .into_iter()
            .map(RemoteHost::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(hosts))
    }

    pub fn from_inventory(inventory: &Inventory) -> Result<Self, RemoteError> {
        Self::from_specs(&inventory.hosts)
    }

    pub fn hosts(&self) -> &[Arc<RemoteHost>] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Runs `command` on every host at once.
    pub async fn execute(&self, command: &str) -> GroupResults<()> {
        let command = command.to_string();
        self.execute_func(move |host| {
            let command = command.clone();
            async move { host.execute(&command).await }
        })
        .await
    }

    /// Runs `f` once per host, each in its own task, and waits for all of
    /// them. A failing host does not stop the others.
    pub async fn execute_func<F, Fut, T>(&self, f: F) -> GroupResults<T>
    where
        F: Fn(Arc<RemoteHost>) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut tasks = JoinSet::new();
        let mut indexes = HashMap::new();
        for (index, host) in self.hosts.iter().enumerate() {
            let run = f(Arc::clone(host));
            let handle = tasks.spawn(async move { (index, run.await) });
            indexes.insert(handle.id(), index);
        }

        let mut results: Vec<Option<Result<T, RemoteError>>> =
            self.hosts.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => {
                    warn!("group task failed: {e}");
                    if let Some(&index) = indexes.get(&e.id()) {
                        results[index] = Some(Err(RemoteError::Join(e)));
                    }
                }
            }
        }

        let outcomes = self
            .hosts
            .iter()
            .zip(results)
            .map(|(host, result)| {
                let result = result.unwrap_or_else(|| Err(RemoteError::Cancelled(host.label())));
                if let Err(e) = &result {
                    debug!("{} group run failed: {e}", host.label());
                }
                HostOutcome {
                    label: host.label(),
                    id: host.id().to_string(),
                    result,
                }
            })
            .collect();

        GroupResults { outcomes }
    }

    /// Closes every host's connection.
    pub async fn close_all(&self) -> GroupResults<()> {
        self.execute_func(|host| async move { host.close().await })
            .await
    }
}

/// Runs `command` on every host of `group` concurrently.
pub async fn execute_on_group(group: &HostGroup, command: &str) -> GroupResults<()> {
    group.execute(command).await
}

/// Runs `f` once per host of `group` concurrently.
pub async fn execute_on_group_func<F, Fut, T>(group: &HostGroup, f: F) -> GroupResults<T>
where
    F: Fn(Arc<RemoteHost>) -> Fut,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    T: Send + 'static,
{
    group.execute_func(f).await
}
