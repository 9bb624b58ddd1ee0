//! Topic provisioning
//!
//! Creates the pulse topic and its dead-letter counterpart at startup with a
//! fixed partition/replication count and a minimum in-sync replica setting.
//! Increasing the partition count of an existing topic changes message
//! partitioning, so existing topics are left untouched.

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::RDKafkaErrorCode;
use tracing::{debug, info};

use super::config::KafkaConfig;
use super::KafkaIntegrationError;
use crate::config::ProvisionConfig;
use crate::error::{Error, Result};

/// Create the given topics if they do not already exist.
///
/// The dead-letter topic is provisioned with the same partition count as the
/// source topic so the partition-preserving dead-letter routing always has a
/// valid target partition.
pub async fn ensure_topics(
    kafka: &KafkaConfig,
    provision: &ProvisionConfig,
    topics: &[&str],
) -> Result<()> {
    let admin: AdminClient<DefaultClientContext> = rdkafka::ClientConfig::new()
        .set("bootstrap.servers", &kafka.brokers)
        .create()
        .map_err(|e| Error::from(KafkaIntegrationError::ConnectionError(e)))?;

    let min_insync = provision.min_insync_replicas.to_string();
    let new_topics: Vec<NewTopic<'_>> = topics
        .iter()
        .map(|name| {
            NewTopic::new(
                name,
                provision.partitions,
                TopicReplication::Fixed(provision.replication),
            )
            .set("min.insync.replicas", &min_insync)
        })
        .collect();

    let results = admin
        .create_topics(&new_topics, &AdminOptions::new())
        .await
        .map_err(|e| {
            Error::from(KafkaIntegrationError::ProvisioningError(format!(
                "Topic creation request failed: {}",
                e
            )))
        })?;

    for result in results {
        match result {
            Ok(topic) => {
                info!(
                    topic = %topic,
                    partitions = provision.partitions,
                    replication = provision.replication,
                    min_insync_replicas = provision.min_insync_replicas,
                    "Created topic"
                );
            },
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                debug!(topic = %topic, "Topic already exists");
            },
            Err((topic, code)) => {
                return Err(Error::from(KafkaIntegrationError::ProvisioningError(
                    format!("Failed to create topic '{}': {}", topic, code),
                )));
            },
        }
    }

    Ok(())
}
