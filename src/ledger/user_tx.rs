//! User workflows: account creation with an outbox hook, email verification

use tracing::info;

use super::error::LedgerError;
use super::models::{
    CreateUserParams, CreateUserTxResult, UpdateUserParams, User, VerifyUserEmailTxParams,
    VerifyUserEmailTxResult,
};
use super::store::{AfterCreate, PgStore};
use crate::outbox::OutboxTask;

/// Hook that queues the verification email for the new user
pub fn enqueue_verify_email() -> AfterCreate {
    Box::new(|user: &User| -> Result<Vec<OutboxTask>, LedgerError> {
        Ok(vec![OutboxTask::send_verify_email(&user.username)?])
    })
}

/// Hook with no side effects
pub fn no_side_effects() -> AfterCreate {
    Box::new(|_: &User| -> Result<Vec<OutboxTask>, LedgerError> { Ok(Vec::new()) })
}

/// Insert the user, run `after_create`, persist the tasks it returns.
///
/// The hook only describes side effects. They reach the outbox table in the
/// same transaction as the user row, and the outbox worker dispatches them
/// after commit, so a failed commit can never leave a task without its user.
pub(super) async fn create_user(
    store: &PgStore,
    arg: CreateUserParams,
    after_create: AfterCreate,
) -> Result<CreateUserTxResult, LedgerError> {
    let result = store
        .exec_tx(move |q| {
            Box::pin(async move {
                let user = q.create_user(&arg).await?;

                let tasks = after_create(&user)?;
                let mut enqueued_tasks = Vec::with_capacity(tasks.len());
                for task in &tasks {
                    enqueued_tasks.push(q.enqueue_task(task).await?);
                }

                Ok(CreateUserTxResult {
                    user,
                    enqueued_tasks,
                })
            })
        })
        .await?;

    info!(
        username = %result.user.username,
        tasks = result.enqueued_tasks.len(),
        "User created"
    );
    Ok(result)
}

/// Consume the verification code and flag the user's email as verified
pub(super) async fn verify_email(
    store: &PgStore,
    arg: VerifyUserEmailTxParams,
) -> Result<VerifyUserEmailTxResult, LedgerError> {
    let result = store
        .exec_tx(move |q| {
            Box::pin(async move {
                let verify_email = q.update_verify_email(arg.email_id, &arg.secret_code).await?;

                let user = q
                    .update_user(&UpdateUserParams {
                        username: verify_email.username.clone(),
                        is_email_verified: Some(true),
                        ..Default::default()
                    })
                    .await?;

                Ok(VerifyUserEmailTxResult { user, verify_email })
            })
        })
        .await?;

    info!(
        username = %result.user.username,
        email_id = result.verify_email.id,
        "Email verified"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::{PayloadSendVerifyEmail, TASK_SEND_VERIFY_EMAIL};
    use chrono::Utc;

    fn user(username: &str) -> User {
        User {
            username: username.to_string(),
            hashed_password: "hash".to_string(),
            full_name: "Full Name".to_string(),
            email: format!("{username}@example.com"),
            is_email_verified: false,
            password_changed_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_enqueue_verify_email_hook() {
        let hook = enqueue_verify_email();
        let tasks = hook(&user("carol")).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_type, TASK_SEND_VERIFY_EMAIL);
        let payload: PayloadSendVerifyEmail = serde_json::from_str(&tasks[0].payload).unwrap();
        assert_eq!(payload.username, "carol");
    }

    #[test]
    fn test_no_side_effects_hook() {
        assert!(no_side_effects()(&user("dave")).unwrap().is_empty());
    }
}
