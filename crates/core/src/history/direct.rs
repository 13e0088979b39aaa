//! Records of one address read straight from the contract.

use alloy_primitives::Address;
use serde::Serialize;

use crate::contract::{ContractError, DataLoggerClient};
use crate::records::{DataRecord, RecordCounts, TransactionRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecords {
    pub data_records: Vec<DataRecord>,
    pub transaction_records: Vec<TransactionRecord>,
}

impl UserRecords {
    pub fn is_empty(&self) -> bool {
        self.data_records.is_empty() && self.transaction_records.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DirectHistory {
    contract: DataLoggerClient,
}

impl DirectHistory {
    pub fn new(contract: DataLoggerClient) -> Self {
        Self { contract }
    }

    /// Both record kinds for `user`, newest first.
    pub async fn user_records(&self, user: Address) -> Result<UserRecords, ContractError> {
        let (data_records, transaction_records) = futures::try_join!(
            self.contract.user_data_records(user),
            self.contract.user_transaction_records(user),
        )?;
        tracing::debug!(
            %user,
            data = data_records.len(),
            transactions = transaction_records.len(),
            "Loaded records from contract"
        );
        Ok(UserRecords {
            data_records,
            transaction_records,
        })
    }

    pub async fn counts(&self) -> Result<RecordCounts, ContractError> {
        self.contract.record_counts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;
    use alloy_primitives::U256;
    use std::sync::Arc;
    use testresult::TestResult;

    #[tokio::test]
    async fn test_user_records_from_contract() -> TestResult {
        let node = Arc::new(MockNode::new());
        let accounts = node.accounts();
        let (alice, bob) = (accounts[0], accounts[1]);
        let address = node.deploy_datalogger(alice)?;
        let contract = DataLoggerClient::new(node.client(), address);

        contract.log_data(alice, "sensor", "t=20").await?;
        contract.log_data(alice, "sensor", "t=21").await?;
        contract.log_data(bob, "sensor", "t=5").await?;
        contract
            .log_with_payment(alice, bob, "rent", U256::from(1_000u64))
            .await?;

        let history = DirectHistory::new(contract);
        let records = history.user_records(alice).await?;
        assert_eq!(records.data_records.len(), 2);
        assert_eq!(records.data_records[0].data, "t=21");
        assert_eq!(records.transaction_records.len(), 1);
        assert_eq!(records.transaction_records[0].memo, "rent");

        let counts = history.counts().await?;
        assert_eq!(counts.data, 3);
        assert_eq!(counts.transactions, 1);

        assert!(history.user_records(accounts[5]).await?.is_empty());
        Ok(())
    }
}
