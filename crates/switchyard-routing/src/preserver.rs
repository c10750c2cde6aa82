//! Context Preserver
//!
//! Adapts an in-flight request for a different provider during failover and
//! keeps per-conversation state so a conversation can move between providers
//! without losing history or customer profile.

use crate::config::FailoverConfig;
use crate::failure::FailureType;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use switchyard_core::normalized::{CompletionRequest, Message, Role};
use switchyard_core::provider::{ModelInfo, ProviderSnapshot};

/// Request metadata key carrying failover provenance
pub const FAILOVER_METADATA_KEY: &str = "failover_context";

/// Messages kept verbatim by `compress_context`
pub const DEFAULT_KEEP_RECENT_MESSAGES: usize = 10;

/// Model → compatible models on other backends, in preference order
const MODEL_COMPATIBILITY: &[(&str, &[&str])] = &[
    ("gpt-4", &["claude-3-sonnet-20240229", "gemini-pro"]),
    ("gpt-3.5-turbo", &["claude-3-haiku-20240307", "gemini-pro"]),
    ("claude-3-sonnet-20240229", &["gpt-4", "gemini-pro"]),
    ("claude-3-haiku-20240307", &["gpt-3.5-turbo", "gemini-pro"]),
    ("gemini-pro", &["gpt-4", "claude-3-sonnet-20240229"]),
    ("deepseek-chat", &["gpt-3.5-turbo", "claude-3-haiku-20240307"]),
];

/// Why and from where a request was moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverProvenance {
    pub original_provider: String,
    pub failure_type: FailureType,
    pub attempt_count: u32,
    pub request_id: String,
}

/// Model name and parameters in effect for a conversation's provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderContext {
    pub model: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

/// Stored state of one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub customer_id: Option<String>,
    pub workload: Option<String>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub customer_profile: BTreeMap<String, Value>,
    pub current_state: Option<String>,
    #[serde(default)]
    pub pending_actions: Vec<String>,
    pub current_provider: Option<String>,
    #[serde(default)]
    pub provider_context: ProviderContext,
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            customer_id: None,
            workload: None,
            history: Vec::new(),
            customer_profile: BTreeMap::new(),
            current_state: None,
            pending_actions: Vec::new(),
            current_provider: None,
            provider_context: ProviderContext::default(),
            summary: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = Some(workload.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>, context: ProviderContext) -> Self {
        self.current_provider = Some(provider.into());
        self.provider_context = context;
        self
    }

    fn is_expired(&self, max_age: Duration) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => Utc::now() - self.updated_at > max_age,
            Err(_) => false,
        }
    }
}

/// What a new provider needs to continue a conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuityData {
    pub current_state: Option<String>,
    pub pending_actions: Vec<String>,
    pub customer_profile: BTreeMap<String, Value>,
    pub conversation_summary: String,
}

/// Compatible model for `original` among `available`
pub fn compatible_model<'a>(original: &str, available: &'a [ModelInfo]) -> Option<&'a ModelInfo> {
    let (_, candidates) = MODEL_COMPATIBILITY
        .iter()
        .find(|(model, _)| *model == original)?;
    candidates
        .iter()
        .find_map(|name| available.iter().find(|m| m.name == *name))
}

/// Model to use on `target` for a request that asked for `requested`
fn target_model(requested: &str, target: &ProviderSnapshot) -> Option<String> {
    let caps = &target.capabilities;
    if caps.models.is_empty() || caps.model(requested).is_some() {
        return None;
    }
    compatible_model(requested, &caps.models)
        .or_else(|| caps.default_model())
        .map(|m| m.name.clone())
}

fn adapt_parameters(parameters: &mut BTreeMap<String, Value>, target: &ProviderSnapshot) {
    let dialect = &target.dialect;
    parameters.retain(|name, _| !dialect.unsupported_parameters.contains(name));
    if let Some(max) = dialect.max_top_p
        && let Some(top_p) = parameters.get("top_p").and_then(|v| v.as_f64())
        && top_p > max
    {
        parameters.insert("top_p".to_string(), json!(max));
    }
}

/// Build a copy of `request` that `target` accepts.
///
/// Remaps the model, strips unsupported parameters, clamps `top_p`,
/// normalizes roles and records failover provenance in the metadata.
pub fn adapt_request(
    request: &CompletionRequest,
    target: &ProviderSnapshot,
    provenance: &FailoverProvenance,
) -> CompletionRequest {
    let mut adapted = request.clone();

    if let Some(model) = target_model(&request.model, target) {
        tracing::info!(
            from = %request.model,
            to = %model,
            provider = %target.id,
            "Remapped model for failover"
        );
        adapted.model = model;
    }

    adapt_parameters(&mut adapted.parameters, target);

    if !target.dialect.supports_tool_role {
        for message in adapted.messages.iter_mut() {
            if message.role == Role::Tool {
                message.role = Role::User;
            }
        }
    }

    if !target.dialect.supports_system_role {
        fold_system_prompt(&mut adapted);
    }

    adapted.metadata.insert(
        FAILOVER_METADATA_KEY.to_string(),
        json!({
            "original_provider": provenance.original_provider,
            "failure_type": provenance.failure_type.as_str(),
            "attempt_count": provenance.attempt_count,
            "request_id": provenance.request_id,
        }),
    );

    adapted
}

/// Move the system prompt and system messages into the first user turn
fn fold_system_prompt(request: &mut CompletionRequest) {
    let mut system_text: Vec<String> = request.system.take().into_iter().collect();
    request.messages.retain(|m| {
        if m.role == Role::System {
            system_text.push(m.content.text());
            false
        } else {
            true
        }
    });
    if system_text.is_empty() {
        return;
    }

    let prefix = format!("System: {}\n\n", system_text.join("\n\n"));
    match request.messages.iter_mut().find(|m| m.role == Role::User) {
        Some(first_user) => first_user.content = first_user.content.prepended(&prefix),
        None => request
            .messages
            .insert(0, Message::user(prefix.trim_end().to_string())),
    }
}

/// Short digest of a run of messages
fn summarize(messages: &[Message]) -> String {
    const EXCERPT: usize = 80;

    let user_turns = messages.iter().filter(|m| m.role == Role::User).count();
    let assistant_turns = messages.iter().filter(|m| m.role == Role::Assistant).count();
    let mut summary = format!(
        "{} messages ({} user, {} assistant)",
        messages.len(),
        user_turns,
        assistant_turns
    );
    if let Some(last_user) = messages.iter().rev().find(|m| m.role == Role::User) {
        let text = last_user.content.text();
        let excerpt: String = text.chars().take(EXCERPT).collect();
        summary.push_str("; last user message: ");
        summary.push_str(&excerpt);
    }
    summary
}

pub struct ContextPreserver {
    enabled: bool,
    max_age: Duration,
    contexts: DashMap<String, ConversationContext>,
}

impl ContextPreserver {
    pub fn new(config: &FailoverConfig) -> Self {
        Self {
            enabled: config.enable_context_preservation,
            max_age: config.context_max_age,
            contexts: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Adapt `request` for `target`, or return it unchanged when
    /// preservation is disabled
    pub fn adapt_request(
        &self,
        request: &CompletionRequest,
        target: &ProviderSnapshot,
        provenance: &FailoverProvenance,
    ) -> CompletionRequest {
        if !self.enabled {
            return request.clone();
        }
        adapt_request(request, target, provenance)
    }

    pub fn store_context(&self, context: ConversationContext) {
        tracing::debug!(conversation_id = %context.conversation_id, "Stored conversation context");
        self.contexts.insert(context.conversation_id.clone(), context);
    }

    /// Stored context, evicting it if it has been idle longer than the
    /// configured age
    pub fn get_context(&self, conversation_id: &str) -> Option<ConversationContext> {
        {
            let context = self.contexts.get(conversation_id)?;
            if !context.is_expired(self.max_age) {
                return Some(context.clone());
            }
        }
        self.contexts.remove(conversation_id);
        tracing::debug!(conversation_id, "Evicted expired conversation context");
        None
    }

    /// Append a message to the conversation, returning false when it is
    /// unknown
    pub fn record_turn(&self, conversation_id: &str, message: Message) -> bool {
        match self.contexts.get_mut(conversation_id) {
            Some(mut context) => {
                context.history.push(message);
                context.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Switch the conversation to `target`. Model and parameters are
    /// remapped only while preservation is enabled; history and customer
    /// profile are always left untouched.
    pub fn transfer_context(
        &self,
        conversation_id: &str,
        target: &ProviderSnapshot,
    ) -> Option<ConversationContext> {
        let context = self.get_context(conversation_id)?;
        let mut entry = self.contexts.get_mut(conversation_id)?;

        let from = context.current_provider.clone();
        if self.enabled {
            let requested = context.provider_context.model.clone().unwrap_or_default();
            if let Some(model) = target_model(&requested, target) {
                entry.provider_context.model = Some(model);
            }
            adapt_parameters(&mut entry.provider_context.parameters, target);
        }
        entry.current_provider = Some(target.id.clone());
        entry.updated_at = Utc::now();

        tracing::info!(
            conversation_id,
            from = ?from,
            to = %target.id,
            "Transferred conversation context"
        );
        Some(entry.clone())
    }

    pub fn extract_continuity_data(&self, conversation_id: &str) -> Option<ContinuityData> {
        let context = self.get_context(conversation_id)?;
        let conversation_summary = match &context.summary {
            Some(summary) if !context.history.is_empty() => {
                format!("{}; {}", summary, summarize(&context.history))
            }
            Some(summary) => summary.clone(),
            None => summarize(&context.history),
        };
        Some(ContinuityData {
            current_state: context.current_state,
            pending_actions: context.pending_actions,
            customer_profile: context.customer_profile,
            conversation_summary,
        })
    }

    /// Keep the `keep_recent` newest messages and summarize the rest
    pub fn compress_context(
        &self,
        context: &ConversationContext,
        keep_recent: usize,
    ) -> ConversationContext {
        let mut compressed = context.clone();
        if context.history.len() <= keep_recent {
            return compressed;
        }

        let split = context.history.len() - keep_recent;
        let dropped = summarize(&context.history[..split]);
        compressed.summary = Some(match &context.summary {
            Some(existing) => format!("{}; {}", existing, dropped),
            None => dropped,
        });
        compressed.history = context.history[split..].to_vec();
        compressed
    }

    /// Remove every expired conversation, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let before = self.contexts.len();
        self.contexts
            .retain(|_, context| !context.is_expired(self.max_age));
        let removed = before.saturating_sub(self.contexts.len());
        if removed > 0 {
            tracing::info!(removed, "Evicted expired conversation contexts");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::normalized::MessageContent;
    use switchyard_core::provider::{
        Dialect, HealthSnapshot, ProviderCapabilities, ProviderKind,
    };

    fn snapshot(id: &str, kind: ProviderKind, models: &[&str]) -> ProviderSnapshot {
        ProviderSnapshot {
            id: id.to_string(),
            kind,
            priority: 1,
            rate_limit_rpm: None,
            capabilities: ProviderCapabilities {
                tags: Default::default(),
                models: models.iter().map(|m| ModelInfo::new(*m, 0.01)).collect(),
                languages: vec![],
            },
            health: HealthSnapshot::default(),
            dialect: Dialect::for_kind(kind),
        }
    }

    fn provenance() -> FailoverProvenance {
        FailoverProvenance {
            original_provider: "openai".to_string(),
            failure_type: FailureType::Timeout,
            attempt_count: 2,
            request_id: "req-1".to_string(),
        }
    }

    fn preserver() -> ContextPreserver {
        ContextPreserver::new(&FailoverConfig::default())
    }

    #[test]
    fn test_compatible_model_lookup() {
        let available = vec![
            ModelInfo::new("gemini-pro", 0.01),
            ModelInfo::new("claude-3-sonnet-20240229", 0.01),
        ];
        assert_eq!(
            compatible_model("gpt-4", &available).map(|m| m.name.as_str()),
            Some("claude-3-sonnet-20240229")
        );
        assert!(compatible_model("unknown-model", &available).is_none());
    }

    #[test]
    fn test_adapt_remaps_model() {
        let request = CompletionRequest::new("gpt-4", vec![Message::user("hi")]);

        let anthropic = snapshot("claude", ProviderKind::Anthropic, &["claude-3-sonnet-20240229"]);
        assert_eq!(
            adapt_request(&request, &anthropic, &provenance()).model,
            "claude-3-sonnet-20240229"
        );

        // No compatible model → first model
        let other = snapshot("other", ProviderKind::Other, &["local-llm", "local-llm-large"]);
        assert_eq!(adapt_request(&request, &other, &provenance()).model, "local-llm");

        // Supported model is kept
        let openai = snapshot("openai2", ProviderKind::OpenAI, &["gpt-3.5-turbo", "gpt-4"]);
        assert_eq!(adapt_request(&request, &openai, &provenance()).model, "gpt-4");
    }

    #[test]
    fn test_adapt_parameters() {
        let request = CompletionRequest::new("gpt-4", vec![Message::user("hi")])
            .with_parameter("top_p", json!(1.0))
            .with_parameter("frequency_penalty", json!(0.5))
            .with_parameter("temperature", json!(0.7));

        let anthropic = snapshot("claude", ProviderKind::Anthropic, &[]);
        let adapted = adapt_request(&request, &anthropic, &provenance());
        assert_eq!(adapted.parameter_f64("top_p"), Some(0.99));
        assert_eq!(adapted.parameter_f64("frequency_penalty"), Some(0.5));

        let gemini = snapshot("gemini", ProviderKind::Gemini, &[]);
        let adapted = adapt_request(&request, &gemini, &provenance());
        assert!(!adapted.parameters.contains_key("frequency_penalty"));
        assert_eq!(adapted.parameter_f64("top_p"), Some(1.0));
        assert_eq!(adapted.parameter_f64("temperature"), Some(0.7));
    }

    #[test]
    fn test_adapt_folds_system_role() {
        let request = CompletionRequest::new(
            "gpt-4",
            vec![
                Message::system("be brief"),
                Message::user("hi"),
                Message::new(Role::Tool, "tool output"),
            ],
        )
        .with_system("you are helpful");

        let gemini = snapshot("gemini", ProviderKind::Gemini, &[]);
        let adapted = adapt_request(&request, &gemini, &provenance());

        assert!(adapted.system.is_none());
        assert_eq!(adapted.messages.len(), 2);
        assert_eq!(adapted.messages[0].role, Role::User);
        assert_eq!(
            adapted.messages[0].content,
            MessageContent::Text("System: you are helpful\n\nbe brief\n\nhi".to_string())
        );
        assert_eq!(adapted.messages[1].role, Role::User);

        // The original is untouched
        assert_eq!(request.messages.len(), 3);
        assert!(request.system.is_some());
    }

    #[test]
    fn test_adapt_system_without_user_turn() {
        let request = CompletionRequest::new("gpt-4", vec![]).with_system("rules");
        let gemini = snapshot("gemini", ProviderKind::Gemini, &[]);
        let adapted = adapt_request(&request, &gemini, &provenance());
        assert_eq!(adapted.messages, vec![Message::user("System: rules")]);
    }

    #[test]
    fn test_adapt_records_provenance() {
        let request = CompletionRequest::new("gpt-4", vec![Message::user("hi")]);
        let target = snapshot("b", ProviderKind::OpenAI, &[]);
        let adapted = adapt_request(&request, &target, &provenance());

        let meta = &adapted.metadata[FAILOVER_METADATA_KEY];
        assert_eq!(meta["original_provider"], "openai");
        assert_eq!(meta["failure_type"], "timeout");
        assert_eq!(meta["attempt_count"], 2);
        assert_eq!(meta["request_id"], "req-1");
    }

    #[test]
    fn test_disabled_preservation_returns_request_unchanged() {
        let config = FailoverConfig {
            enable_context_preservation: false,
            ..FailoverConfig::default()
        };
        let preserver = ContextPreserver::new(&config);
        let request = CompletionRequest::new("gpt-4", vec![Message::system("s")]);
        let gemini = snapshot("gemini", ProviderKind::Gemini, &["gemini-pro"]);
        assert_eq!(preserver.adapt_request(&request, &gemini, &provenance()), request);
    }

    #[test]
    fn test_store_and_get() {
        let p = preserver();
        let mut context = ConversationContext::new("conv-1")
            .with_customer("customer_456")
            .with_workload("sales")
            .with_history(vec![Message::user("hello"), Message::assistant("hi there")]);
        context
            .customer_profile
            .insert("skin_type".to_string(), json!("oily"));
        p.store_context(context);

        let retrieved = p.get_context("conv-1").unwrap();
        assert_eq!(retrieved.customer_id.as_deref(), Some("customer_456"));
        assert_eq!(retrieved.history.len(), 2);
        assert_eq!(retrieved.customer_profile["skin_type"], "oily");
        assert!(p.get_context("missing").is_none());
    }

    #[test]
    fn test_expired_context_is_evicted_on_read() {
        let p = preserver();
        let mut context = ConversationContext::new("old");
        context.created_at = Utc::now() - chrono::Duration::hours(2);
        context.updated_at = context.created_at;
        p.store_context(context);

        assert!(p.get_context("old").is_none());
        assert!(p.is_empty());
    }

    #[test]
    fn test_evict_expired() {
        let p = preserver();
        let mut old = ConversationContext::new("old");
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        old.updated_at = old.created_at;
        p.store_context(old);
        p.store_context(ConversationContext::new("fresh"));

        assert_eq!(p.evict_expired(), 1);
        assert_eq!(p.len(), 1);
        assert!(p.get_context("fresh").is_some());
    }

    #[test]
    fn test_record_turn() {
        let p = preserver();
        p.store_context(ConversationContext::new("conv"));
        assert!(p.record_turn("conv", Message::user("one more")));
        assert!(!p.record_turn("missing", Message::user("lost")));
        assert_eq!(p.get_context("conv").unwrap().history.len(), 1);
    }

    #[test]
    fn test_transfer_context() {
        let p = preserver();
        let mut context = ConversationContext::new("conv")
            .with_history(vec![Message::user("q"), Message::assistant("a")])
            .with_provider(
                "openai",
                ProviderContext {
                    model: Some("gpt-4".to_string()),
                    parameters: BTreeMap::from([("top_p".to_string(), json!(1.0))]),
                },
            );
        context.customer_profile.insert("tier".into(), json!("gold"));
        p.store_context(context.clone());

        let anthropic = snapshot("claude", ProviderKind::Anthropic, &["claude-3-sonnet-20240229"]);
        let moved = p.transfer_context("conv", &anthropic).unwrap();

        assert_eq!(moved.current_provider.as_deref(), Some("claude"));
        assert_eq!(moved.provider_context.model.as_deref(), Some("claude-3-sonnet-20240229"));
        assert_eq!(moved.provider_context.parameters["top_p"], json!(0.99));
        assert_eq!(moved.history, context.history);
        assert_eq!(moved.customer_profile, context.customer_profile);
        assert_eq!(p.get_context("conv").unwrap(), moved);
    }

    #[test]
    fn test_transfer_there_and_back() {
        let p = preserver();
        let mut context = ConversationContext::new("conv")
            .with_customer("customer_123")
            .with_history(vec![
                Message::user("my order arrived damaged"),
                Message::assistant("sorry to hear that, which item?"),
                Message::user("the blue one"),
            ])
            .with_provider(
                "openai",
                ProviderContext {
                    model: Some("gpt-4".to_string()),
                    parameters: BTreeMap::new(),
                },
            );
        context.customer_profile.insert("tier".into(), json!("gold"));
        context
            .customer_profile
            .insert("orders".into(), json!([101, 102]));
        p.store_context(context.clone());

        let anthropic = snapshot("claude", ProviderKind::Anthropic, &["claude-3-sonnet-20240229"]);
        let openai = snapshot("openai", ProviderKind::OpenAI, &["gpt-4"]);
        p.transfer_context("conv", &anthropic).unwrap();
        let back = p.transfer_context("conv", &openai).unwrap();

        assert_eq!(back.current_provider.as_deref(), Some("openai"));
        assert_eq!(back.provider_context.model.as_deref(), Some("gpt-4"));
        assert_eq!(back.history, context.history);
        assert_eq!(back.customer_profile, context.customer_profile);
        assert_eq!(
            serde_json::to_vec(&back.history).unwrap(),
            serde_json::to_vec(&context.history).unwrap()
        );
        assert_eq!(
            serde_json::to_vec(&back.customer_profile).unwrap(),
            serde_json::to_vec(&context.customer_profile).unwrap()
        );
    }

    #[test]
    fn test_transfer_without_preservation_keeps_model() {
        let config = FailoverConfig {
            enable_context_preservation: false,
            ..FailoverConfig::default()
        };
        let p = ContextPreserver::new(&config);
        p.store_context(ConversationContext::new("conv").with_provider(
            "openai",
            ProviderContext {
                model: Some("gpt-4".to_string()),
                parameters: BTreeMap::from([("top_p".to_string(), json!(1.0))]),
            },
        ));

        let anthropic = snapshot("claude", ProviderKind::Anthropic, &["claude-3-sonnet-20240229"]);
        let moved = p.transfer_context("conv", &anthropic).unwrap();
        assert_eq!(moved.current_provider.as_deref(), Some("claude"));
        assert_eq!(moved.provider_context.model.as_deref(), Some("gpt-4"));
        assert_eq!(moved.provider_context.parameters["top_p"], json!(1.0));
    }

    #[test]
    fn test_extract_continuity_data() {
        let p = preserver();
        let mut context = ConversationContext::new("conv").with_history(vec![
            Message::user("looking for anti-aging products"),
            Message::assistant("here are some ingredients"),
            Message::user("are they safe?"),
        ]);
        context.current_state = Some("safety_inquiry".to_string());
        context.pending_actions = vec!["ingredient_safety_check".to_string()];
        context
            .customer_profile
            .insert("safety_conscious".into(), json!(true));
        p.store_context(context);

        let data = p.extract_continuity_data("conv").unwrap();
        assert_eq!(data.current_state.as_deref(), Some("safety_inquiry"));
        assert!(data.pending_actions.contains(&"ingredient_safety_check".to_string()));
        assert_eq!(data.customer_profile["safety_conscious"], json!(true));
        assert!(data.conversation_summary.contains("are they safe?"));
    }

    #[test]
    fn test_compress_context() {
        let p = preserver();
        let history: Vec<Message> = (0..100)
            .flat_map(|i| {
                [
                    Message::user(format!("user message {}", i)),
                    Message::assistant(format!("reply {}", i)),
                ]
            })
            .collect();
        let context = ConversationContext::new("long").with_history(history.clone());

        let compressed = p.compress_context(&context, DEFAULT_KEEP_RECENT_MESSAGES);
        assert_eq!(compressed.history.len(), 10);
        assert_eq!(compressed.history[..], history[190..]);
        let summary = compressed.summary.unwrap();
        assert!(summary.starts_with("190 messages"));

        let short = ConversationContext::new("short").with_history(vec![Message::user("hi")]);
        assert_eq!(p.compress_context(&short, 10), short);
    }
}
