use super::models::{
    Direction, SignatureInfo, TransactionDetail, TransactionRecord, TransactionStatus,
};
use solana_sdk::{native_token::LAMPORTS_PER_SOL, pubkey::Pubkey};

/// Direction and size of a transaction as seen from one account.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub direction: Direction,
    pub amount: Option<f64>,
    pub status: TransactionStatus,
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Classifies `detail` relative to `target` by the change of its lamport balance.
///
/// The same transaction can be a send for one account and a receive for another.
/// A target missing from the account list, or whose balance did not move, yields
/// an unknown direction without an amount.
pub fn classify(detail: &TransactionDetail, target: &Pubkey) -> Classification {
    let status = if detail.failed {
        TransactionStatus::Failed
    } else {
        TransactionStatus::Success
    };

    let delta = detail
        .account_keys
        .iter()
        .position(|key| key == target)
        .and_then(|idx| {
            let pre = *detail.pre_balances.get(idx)?;
            let post = *detail.post_balances.get(idx)?;
            Some(i128::from(post) - i128::from(pre))
        })
        .unwrap_or(0);

    let (direction, amount) = match delta {
        d if d > 0 => (Direction::Receive, Some(delta_to_sol(d))),
        d if d < 0 => (Direction::Send, Some(delta_to_sol(-d))),
        _ => (Direction::Unknown, None),
    };

    Classification {
        direction,
        amount,
        status,
    }
}

fn delta_to_sol(lamports: i128) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Builds the history entry for one signature of `target`.
///
/// An error reported by the signature list marks the record failed even when
/// the transaction detail carries no status metadata.
pub fn to_record(
    info: &SignatureInfo,
    detail: &TransactionDetail,
    target: &Pubkey,
) -> TransactionRecord {
    let classification = classify(detail, target);
    let status = if info.failed {
        TransactionStatus::Failed
    } else {
        classification.status
    };
    TransactionRecord {
        signature: info.signature.clone(),
        block_time: info.block_time,
        slot: info.slot,
        direction: classification.direction,
        amount: classification.amount,
        status,
        fee: lamports_to_sol(detail.fee),
    }
}
