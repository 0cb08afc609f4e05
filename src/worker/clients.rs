use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use url::Url;

/// An open page that a worker may control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
  /// Identifier assigned when the page opened.
  pub id: u64,
  /// URL of the page.
  pub url: Url,
  /// Whether the worker currently serves this page's requests.
  pub controlled: bool,
}

/// Pages open within a worker's scope.
#[derive(Debug, Default)]
pub struct Clients {
  open: Mutex<Vec<Client>>,
  next_id: AtomicU64,
}

impl Clients {
  /// Empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Vec<Client>> {
    self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Record a newly opened page. Pages start uncontrolled until a reload or a claim.
  pub fn open(&self, url: Url) -> u64 {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
    self.lock().push(Client {
      id,
      url,
      controlled: false,
    });
    id
  }

  /// Forget a page that navigated away or was closed.
  pub fn close(&self, id: u64) -> bool {
    let mut open = self.lock();
    let before = open.len();
    open.retain(|client| client.id != id);
    open.len() != before
  }

  /// Take control of every open page inside `scope`. Returns how many changed hands.
  pub fn claim(&self, scope: &Url) -> usize {
    let mut claimed = 0;
    for client in self.lock().iter_mut() {
      if !client.controlled && client.url.as_str().starts_with(scope.as_str()) {
        client.controlled = true;
        claimed += 1;
      }
    }
    claimed
  }

  /// Returns `true` when the page with `id` is controlled.
  pub fn is_controlled(&self, id: u64) -> bool {
    self
      .lock()
      .iter()
      .any(|client| client.id == id && client.controlled)
  }

  /// Snapshot of every open page.
  pub fn all(&self) -> Vec<Client> {
    self.lock().clone()
  }
}
