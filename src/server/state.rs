use std::sync::Arc;

use crate::gateway::TranslationGateway;
use crate::library::SharedLibrary;
use crate::providers::SharedBackend;
use crate::reconcile::PromptListReconciler;

#[derive(Clone)]
pub struct ServerState {
    pub(crate) gateway: Arc<TranslationGateway<SharedBackend>>,
    pub(crate) reconciler: PromptListReconciler<SharedBackend>,
    pub(crate) library: SharedLibrary,
}

impl ServerState {
    pub fn new(gateway: TranslationGateway<SharedBackend>, library: SharedLibrary) -> Self {
        let gateway = Arc::new(gateway);
        Self {
            reconciler: PromptListReconciler::new(gateway.clone()),
            gateway,
            library,
        }
    }
}
