use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bruttus_common::{Error, Message, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::dispatcher::Dispatcher;
use crate::fusion::{FusionRules, fuse_with};
use crate::probe::{ProviderStatus, probe_all};
use crate::prompts::{
    NEXT_STEP_CONTINGENCY_REPLY, NEXT_STEP_HISTORY_LINES, SCOPE_CONTINGENCY_REPLY,
    SCOPE_HISTORY_LINES, build_next_step_prompt, build_scope_analysis_prompt, recent_history,
};
use crate::providers::{LlmProvider, LlmRequest};

/// Providers consulted per reply.
pub const MAX_PROVIDERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    AwaitingScope,
    Operating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyInput,
    /// Another reply is still being computed.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Replied(Message),
    Ignored(IgnoreReason),
}

struct ProviderSlot {
    provider: Arc<dyn LlmProvider>,
    status: ProviderStatus,
}

struct SessionState {
    phase: ConversationPhase,
    scope: Option<String>,
    transcript: Vec<Message>,
}

/// One chat session: scope capture, prompt selection, dual-provider call and
/// transcript. Only one reply is computed at a time.
pub struct Conversation {
    providers: Vec<ProviderSlot>,
    dispatcher: Arc<Dispatcher>,
    rules: FusionRules,
    state: Mutex<SessionState>,
    in_flight: AtomicBool,
}

impl Conversation {
    /// Probe `providers` once and open the session with a status greeting.
    pub async fn start(providers: Vec<Arc<dyn LlmProvider>>, dispatcher: Arc<Dispatcher>) -> Self {
        let statuses = probe_all(&providers).await;
        Self::with_statuses(providers.into_iter().zip(statuses).collect(), dispatcher)
    }

    /// Open a session with availability already known.
    pub fn with_statuses(
        providers: Vec<(Arc<dyn LlmProvider>, ProviderStatus)>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let mut slots: Vec<ProviderSlot> = providers
            .into_iter()
            .map(|(provider, status)| ProviderSlot { provider, status })
            .collect();
        if slots.len() > MAX_PROVIDERS {
            warn!("only {MAX_PROVIDERS} providers are supported; ignoring the rest");
            slots.truncate(MAX_PROVIDERS);
        }

        let conversation = Self {
            providers: slots,
            dispatcher,
            rules: FusionRules::default(),
            state: Mutex::new(SessionState {
                phase: ConversationPhase::AwaitingScope,
                scope: None,
                transcript: Vec::new(),
            }),
            in_flight: AtomicBool::new(false),
        };

        let greeting = format!(
            "BRUTTUS online.\n{}\n\nEnvie o **escopo** do programa (HackerOne).",
            conversation.status_line()
        );
        conversation.lock_state().transcript.push(Message::system(greeting));
        info!("conversation started: {}", conversation.status_line());
        conversation
    }

    pub fn with_fusion_rules(mut self, rules: FusionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Handle one user submission and return the assistant reply.
    ///
    /// Blank input and submissions arriving while a reply is in flight are
    /// ignored and leave the transcript untouched. Every other path appends
    /// the user message, then exactly one assistant message.
    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::EmptyInput);
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            info!("submission ignored: a reply is already in flight");
            return SubmitOutcome::Ignored(IgnoreReason::Busy);
        };

        let (phase, prompt) = {
            let mut state = self.lock_state();
            match state.phase {
                ConversationPhase::AwaitingScope => {
                    let history = recent_history(&state.transcript, SCOPE_HISTORY_LINES);
                    state.transcript.push(Message::user(text));
                    state.scope = Some(text.to_string());
                    state.phase = ConversationPhase::Operating;
                    info!("scope captured, switching to operating phase");
                    (
                        ConversationPhase::AwaitingScope,
                        build_scope_analysis_prompt(text, &history),
                    )
                }
                ConversationPhase::Operating => {
                    state.transcript.push(Message::user(text));
                    let history = recent_history(&state.transcript, NEXT_STEP_HISTORY_LINES);
                    let scope = state.scope.clone().unwrap_or_default();
                    (
                        ConversationPhase::Operating,
                        build_next_step_prompt(&scope, text, &history),
                    )
                }
            }
        };

        let reply = match self.run_dual(prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("using contingency reply: {e}");
                contingency_reply(phase).to_string()
            }
        };

        let message = Message::assistant(reply);
        self.lock_state().transcript.push(message.clone());
        SubmitOutcome::Replied(message)
    }

    /// Send `prompt` to every available provider through the dispatcher and
    /// fuse whatever comes back. A failed provider contributes nothing.
    async fn run_dual(&self, prompt: String) -> Result<String> {
        let available: Vec<&ProviderSlot> =
            self.providers.iter().filter(|s| s.status.available).collect();
        if available.is_empty() {
            return Err(Error::NoProviderAvailable);
        }

        let request = Arc::new(LlmRequest::new(prompt));
        let calls: Vec<_> = available
            .iter()
            .map(|slot| {
                let provider = Arc::clone(&slot.provider);
                let provider_id = provider.provider_id().to_string();
                let request = Arc::clone(&request);
                let call = self
                    .dispatcher
                    .submit(move || async move { provider.complete(&request).await });
                async move {
                    match call.await {
                        Ok(text) => text,
                        Err(e) if e.is_provider_failure() => {
                            warn!(provider = %provider_id, "provider call failed: {e}");
                            String::new()
                        }
                        Err(e) => {
                            warn!(provider = %provider_id, "provider call was not run: {e}");
                            String::new()
                        }
                    }
                }
            })
            .collect();

        let texts = join_all(calls).await;
        Ok(fuse_with(
            &self.rules,
            texts.first().map(String::as_str),
            texts.get(1).map(String::as_str),
        ))
    }

    pub fn transcript(&self) -> Vec<Message> {
        self.lock_state().transcript.clone()
    }

    pub fn phase(&self) -> ConversationPhase {
        self.lock_state().phase
    }

    pub fn scope(&self) -> Option<String> {
        self.lock_state().scope.clone()
    }

    pub fn is_waiting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// `(provider_id, status)` in registration order.
    pub fn provider_statuses(&self) -> Vec<(String, ProviderStatus)> {
        self.providers
            .iter()
            .map(|s| (s.provider.provider_id().to_string(), s.status.clone()))
            .collect()
    }

    /// e.g. `GEMINI: ✅  |  OPENAI: ❌`
    pub fn status_line(&self) -> String {
        self.providers
            .iter()
            .map(|s| {
                let mark = if s.status.available { "✅" } else { "❌" };
                format!("{}: {mark}", s.provider.display_name())
            })
            .collect::<Vec<_>>()
            .join("  |  ")
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn contingency_reply(phase: ConversationPhase) -> &'static str {
    match phase {
        ConversationPhase::AwaitingScope => SCOPE_CONTINGENCY_REPLY,
        ConversationPhase::Operating => NEXT_STEP_CONTINGENCY_REPLY,
    }
}

/// Holds the re-entrancy flag for the duration of one submission.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bruttus_common::Sender;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct StaticMockProvider {
        id: &'static str,
        output: std::result::Result<&'static str, u16>,
        prompts: Mutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
    }

    impl StaticMockProvider {
        fn new(id: &'static str, output: std::result::Result<&'static str, u16>) -> Arc<Self> {
            Arc::new(Self {
                id,
                output,
                prompts: Mutex::new(Vec::new()),
                gate: None,
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for StaticMockProvider {
        fn provider_id(&self) -> &str {
            self.id
        }

        fn display_name(&self) -> &str {
            self.id
        }

        fn api_key_present(&self) -> bool {
            true
        }

        async fn complete(&self, request: &LlmRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.output {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(Error::ProviderHttp {
                    provider: self.id.to_string(),
                    status,
                }),
            }
        }
    }

    fn available() -> ProviderStatus {
        ProviderStatus {
            available: true,
            tested: true,
            error: None,
        }
    }

    fn unavailable() -> ProviderStatus {
        ProviderStatus {
            available: false,
            tested: true,
            error: Some("key absent".to_string()),
        }
    }

    fn slot(
        provider: Arc<StaticMockProvider>,
        status: ProviderStatus,
    ) -> (Arc<dyn LlmProvider>, ProviderStatus) {
        (provider, status)
    }

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::with_limits(1, Duration::ZERO))
    }

    fn reply_text(outcome: SubmitOutcome) -> String {
        match outcome {
            SubmitOutcome::Replied(message) => {
                assert_eq!(message.sender, Sender::Assistant);
                message.text
            }
            SubmitOutcome::Ignored(reason) => panic!("submission ignored: {reason:?}"),
        }
    }

    #[tokio::test]
    async fn greeting_reports_provider_status() {
        let a = StaticMockProvider::new("A", Ok("x"));
        let b = StaticMockProvider::new("B", Ok("x"));
        let conversation = Conversation::with_statuses(
            vec![slot(a, available()), slot(b, unavailable())],
            dispatcher(),
        );

        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].sender, Sender::System);
        assert!(transcript[0].text.starts_with("BRUTTUS online.\nA: ✅  |  B: ❌"));
        assert_eq!(conversation.phase(), ConversationPhase::AwaitingScope);
    }

    #[tokio::test]
    async fn first_submission_captures_scope_once() {
        let a = StaticMockProvider::new("A", Ok("Comece pelo recon"));
        let conversation =
            Conversation::with_statuses(vec![slot(a.clone(), available())], dispatcher());

        reply_text(conversation.submit("  *.example.com  ").await);
        assert_eq!(conversation.phase(), ConversationPhase::Operating);
        assert_eq!(conversation.scope().as_deref(), Some("*.example.com"));
        assert!(a.last_prompt().contains("ESCOPO (resumo do usuário)"));

        reply_text(conversation.submit("subfinder achou 40 hosts").await);
        assert_eq!(conversation.scope().as_deref(), Some("*.example.com"));
        let prompt = a.last_prompt();
        assert!(!prompt.contains("ESCOPO (resumo do usuário)"));
        assert!(prompt.contains("Contexto do projeto:\n*.example.com"));
        assert!(prompt.contains("\"subfinder achou 40 hosts\""));
    }

    #[tokio::test]
    async fn history_windows_differ_by_phase() {
        let a = StaticMockProvider::new("A", Ok("ok"));
        let conversation =
            Conversation::with_statuses(vec![slot(a.clone(), available())], dispatcher());

        conversation.submit("escopo").await;
        // scope prompt sees only what preceded the submission
        let scope_prompt = a.last_prompt();
        assert!(scope_prompt.contains("system: BRUTTUS online."));
        assert!(!scope_prompt.contains("user: escopo"));

        for i in 0..5 {
            conversation.submit(&format!("passo {i}")).await;
        }
        // next-step prompt includes the new message and at most 8 lines
        let prompt = a.last_prompt();
        let history = prompt
            .split("Histórico (recente):\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nTarefa:").next())
            .unwrap();
        assert_eq!(history.lines().filter(|l| l.starts_with("user: ")).count(), 4);
        assert!(history.ends_with("user: passo 4"));
        assert!(!history.contains("system: BRUTTUS online."));
    }

    #[tokio::test]
    async fn no_available_provider_uses_contingency_reply() {
        let a = StaticMockProvider::new("A", Ok("unused"));
        let conversation =
            Conversation::with_statuses(vec![slot(a.clone(), unavailable())], dispatcher());

        let first = reply_text(conversation.submit("program X, *.example.com in scope").await);
        assert_eq!(first, SCOPE_CONTINGENCY_REPLY);
        assert!(first.contains("amass/subfinder"));

        let second = reply_text(conversation.submit("e agora?").await);
        assert_eq!(second, NEXT_STEP_CONTINGENCY_REPLY);
        assert!(a.prompts.lock().unwrap().is_empty());
        assert_eq!(conversation.transcript().len(), 5);
    }

    #[tokio::test]
    async fn failed_provider_contributes_nothing() {
        let a = StaticMockProvider::new("A", Err(500));
        let b = StaticMockProvider::new("B", Ok("Teste IDOR em /api/users/<id>"));
        let conversation = Conversation::with_statuses(
            vec![slot(a, available()), slot(b, available())],
            dispatcher(),
        );

        let reply = reply_text(conversation.submit("escopo").await);
        assert_eq!(reply, "**Resumo direto:**\n- Teste IDOR em /api/users/<id>");
    }

    #[tokio::test]
    async fn all_providers_failing_yields_default_message() {
        let a = StaticMockProvider::new("A", Err(429));
        let b = StaticMockProvider::new("B", Err(503));
        let conversation = Conversation::with_statuses(
            vec![slot(a, available()), slot(b, available())],
            dispatcher(),
        );

        let reply = reply_text(conversation.submit("escopo").await);
        assert_eq!(reply, crate::fusion::EMPTY_REPLY);
    }

    #[tokio::test]
    async fn custom_fusion_rules_are_applied() {
        let a = StaticMockProvider::new("A", Ok("katana -u https://<alvo>"));
        let conversation = Conversation::with_statuses(vec![slot(a, available())], dispatcher())
            .with_fusion_rules(FusionRules::default().with_tool("katana"));

        let reply = reply_text(conversation.submit("escopo").await);
        assert!(reply.contains("**Comandos:**\n```\nkatana -u https://<alvo>\n```"));
    }

    #[tokio::test]
    async fn dispatcher_shutdown_yields_default_message() {
        let a = StaticMockProvider::new("A", Ok("unused"));
        let dispatcher = dispatcher();
        dispatcher.shutdown().await;
        let conversation = Conversation::with_statuses(vec![slot(a.clone(), available())], dispatcher);

        let reply = reply_text(conversation.submit("escopo").await);
        assert_eq!(reply, crate::fusion::EMPTY_REPLY);
        assert!(a.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_submission_is_ignored() {
        let a = StaticMockProvider::new("A", Ok("x"));
        let conversation = Conversation::with_statuses(vec![slot(a, available())], dispatcher());

        assert_eq!(
            conversation.submit("   ").await,
            SubmitOutcome::Ignored(IgnoreReason::EmptyInput)
        );
        assert_eq!(conversation.transcript().len(), 1);
        assert_eq!(conversation.phase(), ConversationPhase::AwaitingScope);
    }

    #[tokio::test]
    async fn submission_while_in_flight_is_ignored() {
        let gate = Arc::new(Notify::new());
        let slow = Arc::new(StaticMockProvider {
            id: "A",
            output: Ok("resposta"),
            prompts: Mutex::new(Vec::new()),
            gate: Some(Arc::clone(&gate)),
        });
        let conversation = Arc::new(Conversation::with_statuses(
            vec![slot(slow.clone(), available())],
            dispatcher(),
        ));

        let background = {
            let conversation = Arc::clone(&conversation);
            tokio::spawn(async move { conversation.submit("escopo").await })
        };

        while slow.prompts.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(conversation.is_waiting());
        let len_before = conversation.transcript().len();

        let outcome = conversation.submit("segunda mensagem").await;
        assert_eq!(outcome, SubmitOutcome::Ignored(IgnoreReason::Busy));
        assert_eq!(conversation.transcript().len(), len_before);

        gate.notify_one();
        let first = background.await.unwrap();
        assert_eq!(reply_text(first), "**Resumo direto:**\n- resposta");
        assert!(!conversation.is_waiting());
        assert_eq!(conversation.transcript().len(), 3);
    }

    #[tokio::test]
    async fn start_keeps_two_providers() {
        let providers: Vec<Arc<dyn LlmProvider>> = ["A", "B", "C"]
            .into_iter()
            .map(|id| StaticMockProvider::new(id, Ok("pong")) as Arc<dyn LlmProvider>)
            .collect();
        let conversation = Conversation::start(providers, dispatcher()).await;

        let ids: Vec<String> = conversation
            .provider_statuses()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(conversation.status_line(), "A: ✅  |  B: ✅");
    }

    #[tokio::test]
    async fn extra_providers_are_dropped() {
        let slots = ["A", "B", "C"]
            .into_iter()
            .map(|id| {
                (
                    StaticMockProvider::new(id, Ok("x")) as Arc<dyn LlmProvider>,
                    available(),
                )
            })
            .collect();
        let conversation = Conversation::with_statuses(slots, dispatcher());
        assert_eq!(conversation.provider_statuses().len(), MAX_PROVIDERS);
    }
}
