// db/accountdb.rs
use async_trait::async_trait;

use super::db::DBClient;
use super::store::{Collection, Filter, OrderBy, StoreResult};
use crate::models::accountmodel::*;

#[async_trait]
pub trait AccountExt {
    async fn get_account(&self, account_id: &str) -> StoreResult<Option<Account>>;

    async fn save_account(&self, account: &Account) -> StoreResult<Account>;

    /// Compare-and-swap on `account.version`.
    async fn update_account(&self, account: &Account) -> StoreResult<Account>;

    async fn delete_account(&self, account_id: &str) -> StoreResult<()>;

    async fn get_accounts_by_role(&self, role: Role) -> StoreResult<Vec<Account>>;

    async fn get_professionals(
        &self,
        approval_status: Option<ApprovalStatus>,
    ) -> StoreResult<Vec<Account>>;
}

#[async_trait]
impl AccountExt for DBClient {
    async fn get_account(&self, account_id: &str) -> StoreResult<Option<Account>> {
        self.fetch(Collection::Accounts, account_id).await
    }

    async fn save_account(&self, account: &Account) -> StoreResult<Account> {
        self.insert(Collection::Accounts, account).await
    }

    async fn update_account(&self, account: &Account) -> StoreResult<Account> {
        self.replace(Collection::Accounts, account).await
    }

    async fn delete_account(&self, account_id: &str) -> StoreResult<()> {
        self.remove(Collection::Accounts, account_id).await
    }

    async fn get_accounts_by_role(&self, role: Role) -> StoreResult<Vec<Account>> {
        self.find(
            Collection::Accounts,
            &Filter::all().eq("role", role.to_str()),
            Some(&OrderBy::asc("createdAt")),
        )
        .await
    }

    async fn get_professionals(
        &self,
        approval_status: Option<ApprovalStatus>,
    ) -> StoreResult<Vec<Account>> {
        let professionals = self.get_accounts_by_role(Role::Professional).await?;
        Ok(professionals
            .into_iter()
            .filter(|account| match approval_status {
                Some(status) => account.approval_status() == Some(status),
                None => true,
            })
            .collect())
    }
}
