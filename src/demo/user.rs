//! # Demo Users
//!
//! The `t_user` model exposed as a list resource and an item resource.
//! Passwords are hashed before they reach storage and never serialized.

use std::sync::{Arc, OnceLock};

use axum::http::StatusCode;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{hash_password, AuthError, PasswordPolicy};
use crate::resource::{
    ArgType, ArgumentSpec, CrudResource, HookResult, Interrupt, Operation, PipelineContext, Reply,
    ResourceError, ResourceHooks, ResourceResult,
};
use crate::storage::{FieldDef, FieldValue, ModelSchema, Record, OPERATOR};
use crate::tasks::TaskQueue;

/// Table name of the demo model
pub const USER_TABLE: &str = "t_user";

/// Task enqueued after a user is created
pub const WELCOME_TASK: &str = "user.welcome";

/// Fields returned to clients
pub const USER_FIELDS: [&str; 9] = [
    "id",
    "uuid",
    "phone",
    "real_name",
    "nick_name",
    "other_info",
    "create_time",
    "update_time",
    "operator",
];

fn default_nick_name() -> FieldValue {
    let suffix = Uuid::new_v4().simple().to_string();
    FieldValue::Text(format!("user{}", &suffix[..8]))
}

/// Shared schema of `t_user`
pub fn user_model() -> Arc<ModelSchema> {
    static MODEL: OnceLock<Arc<ModelSchema>> = OnceLock::new();
    MODEL
        .get_or_init(|| {
            Arc::new(
                ModelSchema::new(USER_TABLE)
                    .field(FieldDef::optional_text("uuid").default_uuid())
                    .field(FieldDef::required_text("phone"))
                    .field(FieldDef::required_text("password"))
                    .field(FieldDef::required_text("real_name"))
                    .field(FieldDef::optional_text("nick_name").default_with(default_nick_name))
                    .field(FieldDef::json("other_info"))
                    .with_audit_fields(),
            )
        })
        .clone()
}

/// Hooks of the user resource
#[derive(Debug, Clone)]
pub struct UserHooks {
    tasks: TaskQueue,
    policy: PasswordPolicy,
}

impl UserHooks {
    pub fn new(tasks: TaskQueue) -> Self {
        Self {
            tasks,
            policy: PasswordPolicy::default(),
        }
    }

    /// Replace a plaintext `password` argument with its hash
    fn hash_password_arg(&self, ctx: &mut PipelineContext<'_>) -> HookResult<()> {
        let Some(Value::String(plain)) = ctx.args.get("password") else {
            return Ok(());
        };

        if let Err(err) = self.policy.validate(plain) {
            return Err(Interrupt::Respond(
                Reply::failed(ctx.request_id(), err.to_string()).with_status(StatusCode::BAD_REQUEST),
            ));
        }

        let hashed = hash_password(plain).map_err(|err: AuthError| ResourceError::hook(err.to_string()))?;
        ctx.args.insert("password".to_string(), Value::String(hashed));
        Ok(())
    }

    fn stamp_operator(ctx: &PipelineContext<'_>, record: &mut Record) {
        if let Some(identity) = ctx.identity() {
            record.set(OPERATOR, FieldValue::Text(identity.to_string()));
        }
    }
}

impl ResourceHooks for UserHooks {
    fn create_preprocess(&self, ctx: &mut PipelineContext<'_>) -> HookResult<()> {
        self.hash_password_arg(ctx)
    }

    fn create_postprocess(&self, ctx: &mut PipelineContext<'_>, record: &mut Record) -> HookResult<()> {
        Self::stamp_operator(ctx, record);
        Ok(())
    }

    fn create_committed(&self, ctx: &PipelineContext<'_>, record: &Record) {
        let payload = json!({
            "id": record.id(),
            "uuid": record.get("uuid").map(FieldValue::to_json),
            "phone": record.get("phone").map(FieldValue::to_json),
        });
        if let Err(err) = self.tasks.enqueue(WELCOME_TASK, payload) {
            warn!(request_id = %ctx.request_id(), error = %err, "Welcome task not queued");
        }
    }

    fn update_preprocess(&self, ctx: &mut PipelineContext<'_>, _record: &Record) -> HookResult<()> {
        self.hash_password_arg(ctx)
    }

    fn update_postprocess(&self, ctx: &mut PipelineContext<'_>, record: &mut Record) -> HookResult<()> {
        Self::stamp_operator(ctx, record);
        Ok(())
    }
}

/// Background greeting for a new user
pub async fn welcome_task(payload: Value) -> Result<Value, String> {
    let uuid = payload
        .get("uuid")
        .and_then(Value::as_str)
        .ok_or_else(|| "payload has no uuid".to_string())?;
    info!(user = uuid, "Welcome user");
    Ok(json!({ "greeted": uuid }))
}

fn list_args() -> Vec<ArgumentSpec> {
    vec![
        ArgumentSpec::new("phone"),
        ArgumentSpec::new("real_name"),
    ]
}

fn create_args() -> Vec<ArgumentSpec> {
    vec![
        ArgumentSpec::json_str("phone").required(),
        ArgumentSpec::json_str("password").required(),
        ArgumentSpec::json_str("real_name").required(),
        ArgumentSpec::json_str("nick_name"),
        ArgumentSpec::json_str("other_info").kind(ArgType::Json),
    ]
}

fn update_args() -> Vec<ArgumentSpec> {
    vec![
        ArgumentSpec::json_str("password"),
        ArgumentSpec::json_str("real_name"),
        ArgumentSpec::json_str("nick_name"),
        ArgumentSpec::json_str("other_info").kind(ArgType::Json),
    ]
}

/// The `users` resource with every operation enabled
pub fn user_resource(tasks: TaskQueue) -> ResourceResult<CrudResource> {
    CrudResource::builder("users", user_model())
        .operations(&Operation::ALL)
        .list_args(list_args())
        .create_args(create_args())
        .update_args(update_args())
        .get_fields(&USER_FIELDS)
        .filter_fields(&["phone", "real_name"])
        .create_unique(&["phone"])
        .updatable(&["password", "real_name", "nick_name", "other_info"])
        .hooks(UserHooks::new(tasks))
        .build()
}
