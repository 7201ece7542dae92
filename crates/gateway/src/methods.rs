use std::{fmt, sync::Arc};

use {
    kraken_protocol::{Call, RpcError},
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use crate::signal::SignalRouter;

/// The result a method produces: the `data` payload or a client-facing error.
pub type MethodResult = Result<Value, RpcError>;

// ── Methods ──────────────────────────────────────────────────────────────────

/// The closed set of RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    List,
    Publish,
    Trickle,
    Subscribe,
}

impl Method {
    pub const ALL: [Self; 4] = [Self::List, Self::Publish, Self::Trickle, Self::Subscribe];

    /// Exact, case-sensitive lookup.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "list" => Some(Self::List),
            "publish" => Some(Self::Publish),
            "trickle" => Some(Self::Trickle),
            "subscribe" => Some(Self::Subscribe),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Publish => "publish",
            Self::Trickle => "trickle",
            Self::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Dispatch table ───────────────────────────────────────────────────────────

/// Routes decoded calls to the signaling backend and shapes their results.
pub struct MethodTable {
    router: Arc<dyn SignalRouter>,
}

impl MethodTable {
    pub fn new(router: Arc<dyn SignalRouter>) -> Self {
        Self { router }
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        Method::ALL.iter().map(|m| m.as_str()).collect()
    }

    pub async fn dispatch(&self, call: &Call) -> MethodResult {
        let Some(method) = Method::parse(&call.method) else {
            warn!(method = %call.method, id = %call.id, "unknown method");
            return Err(RpcError::UnknownMethod(call.method.clone()));
        };

        debug!(%method, id = %call.id, params = call.params.len(), "dispatching method");
        let result = self.invoke(method, &call.params).await;
        match &result {
            Ok(_) => debug!(%method, id = %call.id, "method ok"),
            Err(err) => warn!(%method, id = %call.id, error = %err, "method error"),
        }
        result
    }

    async fn invoke(&self, method: Method, params: &[Value]) -> MethodResult {
        match method {
            Method::List => {
                let peers = self.router.list(params).await?;
                Ok(json!({ "peers": peers }))
            },
            Method::Publish => self.router.publish(params).await,
            Method::Trickle => {
                self.router.trickle(params).await?;
                Ok(json!({}))
            },
            Method::Subscribe => self.router.subscribe(params).await,
        }
    }
}
