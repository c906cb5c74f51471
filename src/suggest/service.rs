use super::fallback::fallback_suggestions;
use super::parse::parse_provider_output;
use super::types::{CacheEntry, Degradation, Provenance, Suggestion, SuggestionReport};
use crate::ai::{build_suggestion_prompt, AiError, SuggestionProvider, SYSTEM_PROMPT};
use crate::detector::detect;
use crate::stations::types::Station;
use moka::future::Cache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long a provider answer is served before the provider is asked again.
pub const SUGGESTION_TTL: Duration = Duration::from_secs(2 * 60);

const CACHE_KEY: &str = "suggestions";

/// Produces mitigation suggestions for stations over their thresholds.
///
/// One instance is created at startup and shared for the lifetime of the
/// process. It owns the only mutable state of the advisor: the cached
/// provider answer and the single-flight flag around the provider call.
pub struct SuggestionService {
    provider: Option<Arc<dyn SuggestionProvider>>,
    cache: Cache<&'static str, CacheEntry>,
    in_flight: Arc<AtomicBool>,
    call_timeout: Duration,
}

/// Holds the single-flight slot; the slot is freed when this is dropped.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SuggestionService {
    pub fn new(provider: Option<Arc<dyn SuggestionProvider>>, call_timeout: Duration) -> Self {
        Self::with_ttl(provider, call_timeout, SUGGESTION_TTL)
    }

    pub fn with_ttl(
        provider: Option<Arc<dyn SuggestionProvider>>,
        call_timeout: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            in_flight: Arc::new(AtomicBool::new(false)),
            call_timeout,
        }
    }

    /// Suggestions for the given stations. Never fails; see [`Self::evaluate`].
    pub async fn get_suggestions(&self, stations: &[Station]) -> Vec<Suggestion> {
        self.evaluate(stations).await.suggestions
    }

    pub async fn evaluate(&self, stations: &[Station]) -> SuggestionReport {
        let violating = detect(stations);
        if violating.is_empty() {
            return SuggestionReport {
                suggestions: Vec::new(),
                provenance: Provenance::NoViolations,
            };
        }

        // Within the TTL the cached answer wins even if the readings changed.
        if let Some(entry) = self.cache.get(CACHE_KEY).await {
            tracing::debug!(cached_at = %entry.created_at, "Serving cached suggestions");
            return SuggestionReport {
                suggestions: entry.suggestions,
                provenance: Provenance::Cache,
            };
        }

        let fallback = fallback_suggestions(&violating);

        match self.refresh(&violating).await {
            Ok(suggestions) => {
                tracing::info!(
                    stations = violating.len(),
                    suggestions = suggestions.len(),
                    "Generated AI suggestions"
                );
                SuggestionReport {
                    suggestions,
                    provenance: Provenance::Provider,
                }
            }
            Err(reason) => {
                log_degradation(&reason);
                SuggestionReport {
                    suggestions: fallback,
                    provenance: Provenance::Fallback(reason),
                }
            }
        }
    }

    /// Asks the provider for fresh suggestions and caches them.
    ///
    /// The call runs on its own task, so a caller that goes away does not
    /// cut it short; the slot is held until it succeeds, fails or times out.
    async fn refresh(&self, violating: &[&Station]) -> Result<Vec<Suggestion>, Degradation> {
        let provider = self.provider.clone().ok_or(Degradation::NoCredential)?;
        let guard = self.try_acquire().ok_or(Degradation::Contention)?;

        let prompt = build_suggestion_prompt(violating);
        let cache = self.cache.clone();
        let call_timeout = self.call_timeout;

        let task = tokio::spawn(async move {
            let _guard = guard;
            let raw = request_completion(provider.as_ref(), &prompt, call_timeout).await?;
            let suggestions = interpret(&raw)?;
            cache
                .insert(
                    CACHE_KEY,
                    CacheEntry {
                        created_at: chrono::Utc::now(),
                        suggestions: suggestions.clone(),
                    },
                )
                .await;
            Ok::<_, Degradation>(suggestions)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(Degradation::Transport(format!("provider task aborted: {}", e))),
        }
    }

    fn try_acquire(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| InFlightGuard(Arc::clone(&self.in_flight)))
    }
}

async fn request_completion(
    provider: &dyn SuggestionProvider,
    prompt: &str,
    call_timeout: Duration,
) -> Result<String, Degradation> {
    match tokio::time::timeout(call_timeout, provider.complete(SYSTEM_PROMPT, prompt)).await {
        Ok(Ok(raw)) => Ok(raw),
        Ok(Err(e)) => Err(classify(e)),
        Err(_) => Err(Degradation::Transport(format!(
            "no answer within {:?}",
            call_timeout
        ))),
    }
}

fn interpret(raw: &str) -> Result<Vec<Suggestion>, Degradation> {
    parse_provider_output(raw).map_err(|e| Degradation::Malformed(e.to_string()))
}

fn classify(error: AiError) -> Degradation {
    match error {
        AiError::RequestFailed(_) | AiError::Timeout(_) => Degradation::Transport(error.to_string()),
        AiError::RateLimited | AiError::ApiError(_) => {
            Degradation::ProviderRejected(error.to_string())
        }
        AiError::JsonParsing(_) => Degradation::Malformed(error.to_string()),
    }
}

fn log_degradation(reason: &Degradation) {
    match reason {
        Degradation::NoCredential => {
            tracing::debug!("No AI credential configured, using fallback suggestions")
        }
        Degradation::Contention => {
            tracing::debug!("AI request already in flight, using fallback suggestions")
        }
        Degradation::Transport(detail) => {
            tracing::warn!(kind = reason.kind(), "AI provider unreachable: {}", detail)
        }
        Degradation::ProviderRejected(detail) => {
            tracing::warn!(kind = reason.kind(), "AI provider rejected request: {}", detail)
        }
        Degradation::Malformed(detail) => {
            tracing::warn!(kind = reason.kind(), "AI response unusable: {}", detail)
        }
    }
}
