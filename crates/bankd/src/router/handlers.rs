//! Per-operation handlers.
//!
//! Each handler follows the same shape: validate the input, authorize via
//! lock ownership or profile ownership, mutate the ledger, build the
//! response. Handlers run only after the router has checked the session
//! and the role permission table.

use chrono::Utc;
use tracing::{debug, info};

use bank_core::{
    parse_positive_amount, AccountId, AccountType, AccountVariant, BankError, BankResult,
    ClientProfile, ContactInfo, Money, MonthStamp, Operation, ResourceId, Role, Transaction,
    Username,
};
use bank_protocol::{AccountSnapshot, Response};

use super::AuthContext;
use crate::state::BankState;

// ============================================================================
// Shared checks
// ============================================================================

/// A missing optional field is a validation failure.
fn require<T>(value: Option<T>, field: &str) -> BankResult<T> {
    value.ok_or_else(|| BankError::InvalidField {
        field: field.to_string(),
        reason: "is required".to_string(),
    })
}

fn require_non_blank(value: &str, field: &str) -> BankResult<()> {
    if value.trim().is_empty() {
        return Err(BankError::InvalidField {
            field: field.to_string(),
            reason: "must not be blank".to_string(),
        });
    }
    Ok(())
}

/// Checks that the caller may act on `owner`'s profile.
///
/// Clients may only act on their own profile. Tellers must hold its lock.
fn authorize_profile(state: &BankState, ctx: &AuthContext, owner: &Username) -> BankResult<()> {
    match ctx.role {
        Role::Client if &ctx.username == owner => Ok(()),
        Role::Client => Err(BankError::ProfileNotAccessible {
            username: owner.clone(),
        }),
        Role::Teller => state
            .locks
            .ensure_held(&ResourceId::Profile(owner.clone()), &ctx.token),
    }
}

/// Checks that `owner`'s profile exists and lists `account_id`.
fn require_listed(state: &BankState, owner: &Username, account_id: AccountId) -> BankResult<()> {
    let profile = state.ledger.profile(owner)?;
    if !state.ledger.account_exists(account_id) {
        return Err(BankError::AccountNotFound { account_id });
    }
    if !profile.owns(account_id) {
        return Err(BankError::AccountNotOwned {
            account_id,
            username: owner.clone(),
        });
    }
    Ok(())
}

/// Parses a credit limit: an exact, non-negative decimal in whole cents.
fn parse_credit_limit(raw: &str) -> BankResult<Money> {
    let limit: Money = raw.parse()?;
    if !limit.has_cent_precision() {
        return Err(BankError::InvalidAmount {
            value: raw.trim().to_string(),
        });
    }
    if limit.is_negative() {
        return Err(BankError::InvalidField {
            field: "credit_limit".to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    Ok(limit)
}

fn account_response(account: &bank_core::Account) -> Response {
    Response::account(AccountSnapshot::from(account))
}

// ============================================================================
// Profiles
// ============================================================================

/// Locks a profile and returns its redacted summary.
pub fn load_profile(state: &BankState, ctx: &AuthContext, username: &Username) -> BankResult<Response> {
    if ctx.role == Role::Client && &ctx.username != username {
        return Err(BankError::ProfileNotAccessible {
            username: username.clone(),
        });
    }
    if !state.ledger.profile_exists(username) {
        return Err(BankError::ProfileNotFound {
            username: username.clone(),
        });
    }

    let guard = state
        .locks
        .acquire_scoped(&ResourceId::Profile(username.clone()), &ctx.token)?;
    let summary = state.ledger.profile_summary(username)?;
    guard.keep();

    debug!(username = %username, by = %ctx.username, "Profile loaded");
    Ok(Response::profile(summary))
}

/// Registers a new profile.
pub fn create_profile(
    state: &BankState,
    username: &Username,
    password: &str,
    contact: ContactInfo,
) -> BankResult<Response> {
    require_non_blank(username.as_str(), "username")?;
    require_non_blank(password, "password")?;

    state
        .ledger
        .create_profile(ClientProfile::new(username.clone(), password, contact))?;
    state.locks.register_slot(ResourceId::Profile(username.clone()));

    Ok(Response::profile(state.ledger.profile_summary(username)?))
}

/// Updates password and/or contact details of a locked profile.
pub fn save_profile(
    state: &BankState,
    ctx: &AuthContext,
    username: &Username,
    password: Option<String>,
    contact: Option<ContactInfo>,
) -> BankResult<Response> {
    state
        .locks
        .ensure_held(&ResourceId::Profile(username.clone()), &ctx.token)?;

    if password.is_none() && contact.is_none() {
        return Err(BankError::InvalidField {
            field: "profile".to_string(),
            reason: "nothing to change".to_string(),
        });
    }
    if let Some(password) = &password {
        require_non_blank(password, "password")?;
    }

    state.ledger.update_profile(username, |profile| {
        if let Some(password) = password {
            profile.set_password(password);
        }
        if let Some(contact) = contact {
            profile.set_contact(contact);
        }
    })?;

    info!(username = %username, by = %ctx.username, "Profile saved");
    Ok(Response::profile(state.ledger.profile_summary(username)?))
}

/// Deletes a locked profile together with the accounts only it lists.
///
/// Every such account is locked first; if another session holds one of
/// them nothing is deleted.
pub fn delete_profile(state: &BankState, ctx: &AuthContext, username: &Username) -> BankResult<Response> {
    let profile_lock = ResourceId::Profile(username.clone());
    state.locks.ensure_held(&profile_lock, &ctx.token)?;

    let exclusive = state.ledger.accounts_listed_only_by(username)?;
    let guards = exclusive
        .iter()
        .map(|id| {
            state
                .locks
                .acquire_scoped(&ResourceId::Account(*id), &ctx.token)
        })
        .collect::<BankResult<Vec<_>>>()?;

    for guard in &guards {
        if let ResourceId::Account(account_id) = guard.resource() {
            state.ledger.remove_account(*account_id)?;
            state.locks.remove_slot(guard.resource());
        }
    }
    drop(guards);

    state.ledger.remove_profile(username)?;
    state.locks.remove_slot(&profile_lock);

    info!(
        username = %username,
        accounts = exclusive.len(),
        by = %ctx.username,
        "Profile deleted"
    );
    Ok(Response::ack())
}

/// Releases a profile lock held by the caller.
pub fn exit_profile(state: &BankState, ctx: &AuthContext, username: Option<Username>) -> BankResult<Response> {
    let username = require(username, "username")?;
    state
        .locks
        .release(&ResourceId::Profile(username), &ctx.token);
    Ok(Response::ack())
}

// ============================================================================
// Accounts
// ============================================================================

/// Locks an account listed by `owner` and returns its snapshot.
pub fn load_account(
    state: &BankState,
    ctx: &AuthContext,
    owner: &Username,
    account_id: AccountId,
) -> BankResult<Response> {
    authorize_profile(state, ctx, owner)?;
    require_listed(state, owner, account_id)?;

    let guard = state
        .locks
        .acquire_scoped(&ResourceId::Account(account_id), &ctx.token)?;
    let account = state.ledger.account(account_id)?;
    guard.keep();

    debug!(account_id = %account_id, by = %ctx.username, "Account loaded");
    Ok(account_response(&account))
}

/// Opens a new account for a locked profile.
pub fn create_account(
    state: &BankState,
    ctx: &AuthContext,
    owner: &Username,
    account_type: AccountType,
    credit_limit: Option<String>,
) -> BankResult<Response> {
    state
        .locks
        .ensure_held(&ResourceId::Profile(owner.clone()), &ctx.token)?;

    let variant = match (account_type, credit_limit) {
        (AccountType::Checking, None) => AccountVariant::Checking,
        (AccountType::Saving, None) => AccountVariant::Saving {
            withdrawal_limit: state.rules.savings_withdrawal_limit,
            withdrawals_this_month: 0,
            last_reset: MonthStamp::of(Utc::now()),
        },
        (AccountType::CreditLine, limit) => {
            let threshold = state.rules.credit_line_checking_threshold;
            if !state.ledger.has_checking_with_balance(owner, threshold)? {
                return Err(BankError::CreditLineIneligible { threshold });
            }
            let credit_limit = match limit {
                Some(raw) => parse_credit_limit(&raw)?,
                None => state.rules.default_credit_limit,
            };
            AccountVariant::CreditLine { credit_limit }
        }
        (other, Some(_)) => {
            return Err(BankError::UnsupportedSetting {
                account_type: other.label(),
            })
        }
    };

    let account = state.ledger.open_account(owner, variant)?;
    state.locks.register_slot(ResourceId::Account(account.id()));

    Ok(account_response(&account))
}

/// Changes the settings of a locked account.
///
/// Exactly one setting may be changed per request.
pub fn save_account(
    state: &BankState,
    ctx: &AuthContext,
    account_id: AccountId,
    withdrawal_limit: Option<u32>,
    credit_limit: Option<String>,
) -> BankResult<Response> {
    state
        .locks
        .ensure_held(&ResourceId::Account(account_id), &ctx.token)?;

    let account = match (withdrawal_limit, credit_limit) {
        (Some(limit), None) => state
            .ledger
            .update_account(account_id, |account| account.set_withdrawal_limit(limit))?,
        (None, Some(raw)) => {
            let limit = parse_credit_limit(&raw)?;
            state
                .ledger
                .update_account(account_id, |account| account.set_credit_limit(limit))?
        }
        (None, None) => {
            return Err(BankError::InvalidField {
                field: "account".to_string(),
                reason: "nothing to change".to_string(),
            })
        }
        (Some(_), Some(_)) => {
            return Err(BankError::InvalidField {
                field: "account".to_string(),
                reason: "change one setting at a time".to_string(),
            })
        }
    };

    info!(account_id = %account_id, by = %ctx.username, "Account saved");
    Ok(account_response(&account))
}

/// Deletes a locked account and unlists it everywhere.
pub fn delete_account(state: &BankState, ctx: &AuthContext, account_id: AccountId) -> BankResult<Response> {
    let resource = ResourceId::Account(account_id);
    state.locks.ensure_held(&resource, &ctx.token)?;

    state.ledger.remove_account(account_id)?;
    state.locks.remove_slot(&resource);

    Ok(Response::ack())
}

/// Releases an account lock held by the caller.
pub fn exit_account(state: &BankState, ctx: &AuthContext, account_id: Option<AccountId>) -> BankResult<Response> {
    let account_id = require(account_id, "account_id")?;
    state
        .locks
        .release(&ResourceId::Account(account_id), &ctx.token);
    Ok(Response::ack())
}

/// Lists a locked account on another profile.
pub fn share_account(
    state: &BankState,
    ctx: &AuthContext,
    owner: &Username,
    account_id: AccountId,
    target: &Username,
) -> BankResult<Response> {
    authorize_profile(state, ctx, owner)?;
    state
        .locks
        .ensure_held(&ResourceId::Account(account_id), &ctx.token)?;
    require_listed(state, owner, account_id)?;

    let added = state.ledger.link_account(target, account_id)?;
    info!(
        account_id = %account_id,
        owner = %owner,
        target = %target,
        added,
        "Account shared"
    );
    Ok(Response::ack())
}

/// Applies a deposit or withdrawal to a locked account.
///
/// On success the refreshed snapshot is returned.
pub fn transaction(
    state: &BankState,
    ctx: &AuthContext,
    account_id: AccountId,
    operation: Operation,
    amount: &str,
) -> BankResult<Response> {
    state
        .locks
        .ensure_held(&ResourceId::Account(account_id), &ctx.token)?;
    let amount = parse_positive_amount(amount)?;

    let account = state
        .ledger
        .add_transaction(account_id, Transaction::now(operation, amount))?;

    info!(
        account_id = %account_id,
        operation = %operation,
        amount = %amount,
        balance = %account.balance(),
        "Transaction applied"
    );
    Ok(account_response(&account))
}
