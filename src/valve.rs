use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{CachedRule, RuleCache};
use crate::compile::compile_expr;
use crate::config::{ValveConfig, ValveOptions};
use crate::error::{ConfigError, ValveError};
use crate::rules_map::rule_specification;
use crate::store::RecordStore;
use crate::validate::check;
use crate::{Action, Context, Evaluation, Message, RuleSource, RuleType, Section, Topic, Value};

enum Resolution {
    Fixed(bool),
    Compiled(CachedRule),
}

/// Decides whether a user may perform the action a message describes.
///
/// Holds the rule configuration, the compiled rule cache and the record
/// store used to load `data`, `oldData` and cross-referenced records.
pub struct PermissionValve {
    config: RwLock<Arc<ValveConfig>>,
    options: ValveOptions,
    cache: Arc<RuleCache>,
    store: Arc<dyn RecordStore>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PermissionValve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionValve")
            .field("options", &self.options)
            .field("cached_rules", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl PermissionValve {
    /// # Errors
    ///
    /// Invalid `options`, or a config without root entries when
    /// [`ValveOptions::require_root_entries`] is set.
    pub fn new(
        config: ValveConfig,
        options: ValveOptions,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        if options.require_root_entries {
            config.require_root_entries()?;
        }
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            options,
            cache: Arc::new(RuleCache::new()),
            store,
            sweeper: Mutex::new(None),
        })
    }

    /// Start evicting unused rules every
    /// [`cache_evacuation_interval`](ValveOptions::cache_evacuation_interval).
    /// Replaces a previously started sweeper. Must be called inside a tokio
    /// runtime.
    pub fn spawn_sweeper(&self) {
        let handle = self
            .cache
            .spawn_sweeper(self.options.cache_evacuation_interval);
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    #[must_use]
    pub fn options(&self) -> &ValveOptions {
        &self.options
    }

    #[must_use]
    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    #[must_use]
    pub fn config(&self) -> Arc<ValveConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install a new rule configuration and drop every cached rule.
    ///
    /// Decisions already in flight finish against the rule they resolved.
    ///
    /// # Errors
    ///
    /// A config without root entries when
    /// [`ValveOptions::require_root_entries`] is set. The current config
    /// stays in place.
    pub fn use_config(&self, config: ValveConfig) -> Result<(), ConfigError> {
        if self.options.require_root_entries {
            config.require_root_entries()?;
        }
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(config);
        // under the write guard so no rule compiled from the old config lands after the reset
        self.cache.reset();
        drop(current);
        info!("permission config installed");
        Ok(())
    }

    /// Decide `message` for `user`.
    ///
    /// `Ok(false)` is a rule-computed denial. Every `Err` also means the
    /// action is denied.
    ///
    /// # Errors
    ///
    /// [`ValveError`] when no decision could be reached.
    pub async fn authorize(
        &self,
        user: &str,
        message: &Message,
        auth_data: serde_json::Value,
    ) -> Result<bool, ValveError> {
        match self.options.evaluation_timeout {
            Some(after) => tokio::time::timeout(after, self.decide(user, message, auth_data))
                .await
                .map_err(|_| ValveError::Timeout { after })?,
            None => self.decide(user, message, auth_data).await,
        }
    }

    /// Callback form of [`authorize`](Self::authorize), run as a task on the
    /// current tokio runtime.
    ///
    /// `callback` gets `(None, allowed)` for a decision and
    /// `(Some(error), false)` otherwise. Aborting the returned handle
    /// discards the decision without calling `callback`.
    pub fn can_perform_action<F>(
        self: &Arc<Self>,
        user: impl Into<String>,
        message: Message,
        auth_data: serde_json::Value,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Option<ValveError>, bool) + Send + 'static,
    {
        let valve = Arc::clone(self);
        let user = user.into();
        tokio::spawn(async move {
            match valve.authorize(&user, &message, auth_data).await {
                Ok(allowed) => callback(None, allowed),
                Err(error) => callback(Some(error), false),
            }
        })
    }

    async fn decide(
        &self,
        user: &str,
        message: &Message,
        auth_data: serde_json::Value,
    ) -> Result<bool, ValveError> {
        let Some(spec) = rule_specification(message)? else {
            return Ok(true);
        };
        let cached = match self.resolve(spec.section, &message.name, spec.rule_type)? {
            Resolution::Fixed(allowed) => return Ok(allowed),
            Resolution::Compiled(cached) => cached,
        };
        let rule = &cached.rule;
        if let Some(allowed) = rule.constant() {
            return Ok(allowed);
        }

        let mut ctx = Context::new()
            .with_user(user, Value::from(auth_data))
            .with_variables(cached.template.captures(&message.name).unwrap_or_default())
            .with_now(now_ms())
            .with_action(message.action.as_str())
            .with_name(&message.name);

        let is_patch = message.topic == Topic::Record && message.action == Action::Patch;
        let own_record = if rule.has_old_data() || (is_patch && rule.has_data()) {
            let stored = self.fetch(&message.name).await?;
            ctx.insert_record(
                message.name.clone(),
                stored.clone().map_or(Value::Null, Value::from),
            );
            Some(stored)
        } else {
            None
        };

        if rule.has_data() {
            let data = message_data(message, own_record.as_ref())?;
            ctx = ctx.with_data(data);
        }
        if rule.has_old_data() {
            let old_data = own_record.flatten().map_or(Value::Null, Value::from);
            ctx = ctx.with_old_data(old_data);
        }

        let mut iterations = 0;
        loop {
            iterations += 1;
            if iterations > self.options.max_rule_iterations {
                warn!(name = %message.name, rule = rule.source(), "exceeded max iteration count");
                return Err(ValveError::IterationLimit);
            }
            match rule.evaluate(&ctx) {
                Evaluation::Done(result) => return Ok(result.truthy()),
                Evaluation::Failed(source) => {
                    warn!(
                        name = %message.name,
                        rule = rule.source(),
                        "error when executing rule: {source}"
                    );
                    return Err(ValveError::Evaluation {
                        name: message.name.clone(),
                        rule: rule.source().to_owned(),
                        source,
                    });
                }
                Evaluation::NeedsRecords(names) => {
                    for name in names {
                        let data = self.fetch(&name).await?;
                        ctx.insert_record(name, data.map_or(Value::Null, Value::from));
                    }
                }
            }
        }
    }

    fn resolve(
        &self,
        section: Section,
        name: &str,
        rule_type: RuleType,
    ) -> Result<Resolution, ValveError> {
        if let Some(cached) = self.cache.get(section, name, rule_type) {
            debug!(%section, name, %rule_type, "rule cache hit");
            return Ok(Resolution::Compiled(cached));
        }

        // held through the insert below, see use_config
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        let Some((path, rule)) = config.find_rule(section, name, rule_type) else {
            debug!(%section, name, %rule_type, "no matching rule");
            return Ok(Resolution::Fixed(self.options.default_allow));
        };
        let source = match rule {
            RuleSource::Bool(allowed) => return Ok(Resolution::Fixed(*allowed)),
            RuleSource::Expression(source) => source,
        };

        debug!(%section, name, %rule_type, path = path.template().raw(), "rule cache miss");
        let expr = check(source, section, rule_type)?;
        let compiled = compile_expr(source, &expr, path.template().variables())?;
        let cached = CachedRule {
            template: Arc::clone(path.template()),
            rule: Arc::new(compiled),
        };
        self.cache.set(section, name, rule_type, cached.clone());
        Ok(Resolution::Compiled(cached))
    }

    /// Record data, `None` when it doesn't exist.
    async fn fetch(&self, name: &str) -> Result<Option<serde_json::Value>, ValveError> {
        debug!(record = name, "loading record for permissioning");
        match self.store.get(name).await {
            Ok(record) => Ok(record.map(|r| r.data)),
            Err(source) => {
                error!(record = name, "failed to load record for permissioning: {source}");
                Err(ValveError::DependencyFetch {
                    record: name.to_owned(),
                    source,
                })
            }
        }
    }
}

impl Drop for PermissionValve {
    fn drop(&mut self) {
        let slot = self.sweeper.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

/// `data` for a message: the payload, or for a record patch the stored
/// record with the patch applied. `own_record` is the stored record when it
/// was loaded.
fn message_data(
    message: &Message,
    own_record: Option<&Option<serde_json::Value>>,
) -> Result<Value, ValveError> {
    let payload = || match message.parse_data() {
        None => Ok(None),
        Some(Ok(value)) => Ok(Some(value)),
        Some(Err(e)) => Err(ValveError::MessageData {
            reason: e.to_string(),
        }),
    };

    match (message.topic, message.action) {
        (Topic::Record, Action::Patch) => {
            let path = message.path.as_deref().ok_or_else(|| ValveError::MessageData {
                reason: format!("missing path for record patch {}", message.name),
            })?;
            let patch = payload()?.unwrap_or(serde_json::Value::Null);
            let Some(Some(current)) = own_record else {
                return Err(ValveError::MessageData {
                    reason: format!("Tried to apply patch to non-existant record {}", message.name),
                });
            };
            let mut patched = current.clone();
            set_path(&mut patched, path, patch)?;
            Ok(Value::from(patched))
        }
        (Topic::Record, Action::Update)
        | (Topic::Event, Action::Emit)
        | (Topic::Rpc, Action::Request) => {
            Ok(payload()?.map_or(Value::Undefined, Value::from))
        }
        _ => Ok(Value::Undefined),
    }
}

fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_millis() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'p> {
    Key(&'p str),
    Index(usize),
}

/// Split `a.b[2].c` into keys and array indexes. Empty parts are skipped.
fn segments(path: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    for part in path.split('.').filter(|p| !p.is_empty()) {
        let (key, mut rest) = part.split_at(part.find('[').unwrap_or(part.len()));
        if !key.is_empty() {
            out.push(Segment::Key(key));
        }
        while let Some(open) = rest.strip_prefix('[') {
            let Some(close) = open.find(']') else {
                break;
            };
            let index = &open[..close];
            out.push(match index.trim().parse() {
                Ok(i) => Segment::Index(i),
                Err(_) => Segment::Key(index),
            });
            rest = &open[close + 1..];
        }
    }
    out
}

/// Highest array index a patch path may address.
const MAX_PATCH_INDEX: usize = 4096;

/// Set `value` at a JSON `path` inside `root`, creating objects and arrays
/// along the way and replacing scalars that are in the way.
fn set_path(
    root: &mut serde_json::Value,
    path: &str,
    value: serde_json::Value,
) -> Result<(), ValveError> {
    let segments = segments(path);
    let mut node = root;
    for segment in &segments {
        node = child(node, *segment)?;
    }
    *node = value;
    Ok(())
}

fn child<'n>(
    node: &'n mut serde_json::Value,
    segment: Segment<'_>,
) -> Result<&'n mut serde_json::Value, ValveError> {
    use serde_json::Value as Json;

    match (node, segment) {
        (Json::Array(items), Segment::Index(index)) => {
            let len = index
                .checked_add(1)
                .filter(|_| index <= MAX_PATCH_INDEX)
                .ok_or_else(|| ValveError::MessageData {
                    reason: format!("patch index {index} is out of range"),
                })?;
            if items.len() < len {
                items.resize(len, Json::Null);
            }
            Ok(&mut items[index])
        }
        (Json::Object(map), Segment::Key(key)) => Ok(map.entry(key).or_insert(Json::Null)),
        (node, Segment::Index(_)) => {
            *node = Json::Array(Vec::new());
            child(node, segment)
        }
        (node, Segment::Key(_)) => {
            *node = Json::Object(serde_json::Map::new());
            child(node, segment)
        }
    }
}
