// DynamoDB backend.
//
// Table layout: partition key `PK` (S), sort key `SK` (S), TTL attribute
// `ttl`. Table creation is out of band. Credentials come from the default
// AWS provider chain.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::info;

use paddock_common::Config;

use crate::backend::{CacheBackend, CacheRecord, PK_ATTR, SK_ATTR};
use crate::error::{CacheError, Result};
use crate::keys::CacheKey;
use crate::normalize::StoredValue;

pub struct DynamoBackend {
    client: Client,
    table: String,
}

impl DynamoBackend {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Client for `config.aws_region`, pointed at `config.dynamodb_endpoint`
    /// when one is set (DynamoDB Local).
    pub async fn from_config(config: &Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()));
        if let Some(endpoint) = &config.dynamodb_endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let sdk_config = loader.load().await;

        info!(
            table = %config.dynamodb_table,
            region = %config.aws_region,
            "DynamoDB cache backend ready"
        );
        Self::new(Client::new(&sdk_config), config.dynamodb_table.clone())
    }

    fn key_attrs(key: &CacheKey) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (PK_ATTR.to_string(), AttributeValue::S(key.pk.clone())),
            (SK_ATTR.to_string(), AttributeValue::S(key.sk.clone())),
        ])
    }
}

#[async_trait]
impl CacheBackend for DynamoBackend {
    async fn get_item(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        let out = self
            .client
            .get_item()
            .table_name(&self.table)
            .set_key(Some(Self::key_attrs(key)))
            .send()
            .await
            .map_err(|e| CacheError::backend("get", DisplayErrorContext(e)))?;

        match out.item {
            None => Ok(None),
            Some(item) => CacheRecord::from_item(from_attrs(item)?).map(Some),
        }
    }

    async fn put_item(&self, record: CacheRecord) -> Result<()> {
        let item = record
            .into_item()
            .into_iter()
            .map(|(k, v)| (k, to_attr(v)))
            .collect::<HashMap<_, _>>();

        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| CacheError::backend("put", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn delete_item(&self, key: &CacheKey) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .set_key(Some(Self::key_attrs(key)))
            .send()
            .await
            .map_err(|e| CacheError::backend("delete", DisplayErrorContext(e)))?;
        Ok(())
    }
}

// --- Attribute conversion ---

fn to_attr(value: StoredValue) -> AttributeValue {
    match value {
        StoredValue::S(s) => AttributeValue::S(s),
        StoredValue::N(n) => AttributeValue::N(n),
        StoredValue::Bool(b) => AttributeValue::Bool(b),
        StoredValue::Null => AttributeValue::Null(true),
        StoredValue::L(items) => AttributeValue::L(items.into_iter().map(to_attr).collect()),
        StoredValue::M(fields) => AttributeValue::M(fields.into_iter().map(|(k, v)| (k, to_attr(v))).collect()),
    }
}

fn from_attr(attr: AttributeValue) -> Result<StoredValue> {
    Ok(match attr {
        AttributeValue::S(s) => StoredValue::S(s),
        AttributeValue::N(n) => StoredValue::N(n),
        AttributeValue::Bool(b) => StoredValue::Bool(b),
        AttributeValue::Null(_) => StoredValue::Null,
        AttributeValue::L(items) => StoredValue::L(items.into_iter().map(from_attr).collect::<Result<_>>()?),
        AttributeValue::M(fields) => StoredValue::M(from_attrs(fields)?),
        other => return Err(CacheError::Malformed(format!("unsupported attribute type: {other:?}"))),
    })
}

fn from_attrs(item: HashMap<String, AttributeValue>) -> Result<BTreeMap<String, StoredValue>> {
    item.into_iter()
        .map(|(k, v)| Ok((k, from_attr(v)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_conversion_round_trips() {
        let value = StoredValue::M(BTreeMap::from([
            ("name".to_string(), StoredValue::S("シュガーハート".into())),
            ("rate".to_string(), StoredValue::N("33.3".into())),
            ("ok".to_string(), StoredValue::Bool(true)),
            ("none".to_string(), StoredValue::Null),
            (
                "results".to_string(),
                StoredValue::L(vec![StoredValue::N("1".into()), StoredValue::S("".into())]),
            ),
        ]));
        assert_eq!(from_attr(to_attr(value.clone())).unwrap(), value);
    }

    #[test]
    fn sets_are_rejected() {
        let attr = AttributeValue::Ss(vec!["a".into()]);
        assert!(matches!(from_attr(attr), Err(CacheError::Malformed(_))));
    }
}
