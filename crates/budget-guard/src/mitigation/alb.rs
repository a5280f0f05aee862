//! AWS Application Load Balancer rule priority backend

use std::collections::HashMap;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_elasticloadbalancingv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_elasticloadbalancingv2::operation::set_rule_priorities::SetRulePrioritiesError;
use aws_sdk_elasticloadbalancingv2::types::RulePriorityPair;
use aws_sdk_elasticloadbalancingv2::Client;
use tracing::{debug, info};

use super::{BackendError, MitigationBackend};
use crate::models::MitigationTarget;

/// Error codes that mean the caller's credentials were refused
const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "ExpiredTokenException",
    "AccessDenied",
];

/// Error codes that mean the rule or priority is wrong
const TARGET_ERROR_CODES: &[&str] = &["RuleNotFound", "ValidationError", "PriorityInUse"];

/// Sets listener rule priorities through `SetRulePriorities`
///
/// One SDK client is built per region at startup; credentials come from the
/// default AWS provider chain (environment, profile, instance role).
pub struct AlbRuleBackend {
    clients: HashMap<String, RegionClient>,
}

struct RegionClient {
    client: Client,
    credentials: Option<aws_credential_types::provider::SharedCredentialsProvider>,
}

impl AlbRuleBackend {
    /// Build clients for every region in `regions`
    pub async fn new<'a>(regions: impl IntoIterator<Item = &'a str>, timeout: Duration) -> Self {
        let mut clients = HashMap::new();

        for region in regions {
            if clients.contains_key(region) {
                continue;
            }

            let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .timeout_config(
                    TimeoutConfig::builder()
                        .operation_timeout(timeout)
                        .connect_timeout(timeout)
                        .build(),
                )
                .load()
                .await;

            debug!(region, "Created load balancer client");
            clients.insert(
                region.to_string(),
                RegionClient {
                    credentials: sdk_config.credentials_provider(),
                    client: Client::new(&sdk_config),
                },
            );
        }

        Self { clients }
    }
}

#[async_trait::async_trait]
impl MitigationBackend for AlbRuleBackend {
    async fn set_priority(&self, target: &MitigationTarget) -> Result<(), BackendError> {
        let region = self.clients.get(&target.region).ok_or_else(|| {
            BackendError::InvalidTarget(format!("no client configured for region {}", target.region))
        })?;

        let provider = region.credentials.as_ref().ok_or_else(|| {
            BackendError::MissingCredentials("no AWS credentials provider configured".into())
        })?;
        provider
            .provide_credentials()
            .await
            .map_err(|e| BackendError::MissingCredentials(DisplayErrorContext(&e).to_string()))?;

        region
            .client
            .set_rule_priorities()
            .rule_priorities(
                RulePriorityPair::builder()
                    .rule_arn(&target.target_id)
                    .priority(target.desired_priority)
                    .build(),
            )
            .send()
            .await
            .map_err(classify)?;

        info!(
            target = %target.name,
            region = %target.region,
            priority = target.desired_priority,
            "Rule priority updated"
        );
        Ok(())
    }
}

fn classify<R>(err: SdkError<SetRulePrioritiesError, R>) -> BackendError
where
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            BackendError::TransientConnectivity(message)
        }
        SdkError::ServiceError(service) => {
            let inner = service.err();
            if matches!(inner, SetRulePrioritiesError::RuleNotFoundException(_)) {
                return BackendError::InvalidTarget(message);
            }
            classify_code(inner.code(), message)
        }
        _ => BackendError::Other(message),
    }
}

fn classify_code(code: Option<&str>, message: String) -> BackendError {
    match code {
        Some(code) if CREDENTIAL_ERROR_CODES.contains(&code) => {
            BackendError::MissingCredentials(message)
        }
        Some(code) if TARGET_ERROR_CODES.contains(&code) => BackendError::InvalidTarget(message),
        Some("Throttling" | "ThrottlingException" | "ServiceUnavailable") => {
            BackendError::TransientConnectivity(message)
        }
        _ => BackendError::Other(message),
    }
}
