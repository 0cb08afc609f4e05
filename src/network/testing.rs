//! Scripted network used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::http::{Request, Response};
use crate::network::{Network, NetworkError};

#[derive(Debug, Clone)]
enum Route {
  Respond(Response),
  Fail,
}

/// Network answering from a fixed table, optionally holding every request until released.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedNetwork {
  routes: Arc<Mutex<HashMap<String, Route>>>,
  calls: Arc<Mutex<Vec<String>>>,
  gate: Option<Arc<Semaphore>>,
}

impl ScriptedNetwork {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Requests block until [`ScriptedNetwork::release`] is called once per request.
  pub(crate) fn gated() -> Self {
    Self {
      gate: Some(Arc::new(Semaphore::new(0))),
      ..Self::default()
    }
  }

  pub(crate) fn respond(&self, url: &str, status: u16, body: &str) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Route::Respond(Response::new(status, body)));
    self
  }

  pub(crate) fn fail(&self, url: &str) -> &Self {
    self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
    self
  }

  pub(crate) fn release(&self, requests: usize) {
    if let Some(gate) = &self.gate {
      gate.add_permits(requests);
    }
  }

  pub(crate) fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

impl Network for ScriptedNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let key = request.cache_key();
    self.calls.lock().unwrap().push(key.clone());

    if let Some(gate) = &self.gate {
      gate
        .acquire()
        .await
        .expect("scripted network gate closed")
        .forget();
    }

    let route = self.routes.lock().unwrap().get(&key).cloned();
    match route {
      Some(Route::Respond(response)) => Ok(response),
      Some(Route::Fail) => Err(NetworkError::Disconnected),
      None => Ok(Response::new(404, Vec::new())),
    }
  }
}
