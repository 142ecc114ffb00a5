//! Fuzz target for the messaging orchestrator state machine
//!
//! Arbitrary wallet events, user commands and completions of in-flight
//! actions, including completions delivered after the session moved on.
//!
//! # Invariants
//!
//! - Status invariants from the harness registry hold after every step
//! - A second send/refresh/decrypt is rejected while one is in flight
//! - Completions from a previous session change nothing

#![no_main]

use arbitrary::Arbitrary;
use hushboard_app::{
    Action, DecryptedMessage, Event, InstanceInfo, MessageLists, OperationError, Orchestrator,
    OrchestratorConfig, Rejection,
};
use hushboard_core::{
    Address, Handle, LOCAL_CHAIN_ID, MessageId, SEPOLIA_CHAIN_ID, SubmitReceipt, TxHash,
    WalletEvent,
};
use hushboard_harness::{InvariantRegistry, StatusTrace};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Step {
    Connected { account: u8, chain: u8 },
    ChainChanged(u8),
    AccountsChanged(Vec<u8>),
    Disconnected,
    Connect,
    Send { recipient: u8, text: String },
    SendRaw { recipient: String },
    Refresh,
    Decrypt(u8),
    SwitchNetwork,
    RetryInstance,
    Complete { index: u8, succeed: bool, ids: Vec<u8> },
}

fn account(byte: u8) -> Address {
    Address::new([byte % 4 + 1; 20])
}

fn chain(byte: u8) -> u64 {
    match byte % 3 {
        0 => LOCAL_CHAIN_ID,
        1 => SEPOLIA_CHAIN_ID,
        _ => u64::from(byte),
    }
}

fn failure() -> OperationError {
    OperationError::RpcUnavailable { reason: "fuzz".into() }
}

fn completion(action: Action, succeed: bool, ids: &[u8], next_id: &mut MessageId) -> Option<Event> {
    let event = match action {
        Action::Connect { ticket } => Event::ConnectFinished {
            ticket,
            result: if succeed { Ok((vec![account(0)], LOCAL_CHAIN_ID)) } else { Err(failure()) },
        },
        Action::CreateInstance { ticket, chain_id, .. } => Event::InstanceCreated {
            ticket,
            result: if succeed {
                Ok(InstanceInfo { chain_id, generation: ticket.id })
            } else {
                Err(failure())
            },
        },
        Action::Send { ticket, .. } => {
            let message_id = *next_id;
            *next_id += 1;
            Event::SendFinished {
                ticket,
                result: if succeed {
                    Ok(SubmitReceipt { tx_hash: TxHash::new([0; 32]), message_id })
                } else {
                    Err(failure())
                },
            }
        },
        Action::Refresh { ticket, .. } => Event::RefreshFinished {
            ticket,
            result: if succeed {
                let ids: Vec<MessageId> = ids.iter().map(|&b| MessageId::from(b)).collect();
                Ok(MessageLists { sent: ids.clone(), received: ids })
            } else {
                Err(failure())
            },
        },
        Action::Decrypt { ticket, message_id, .. } => Event::DecryptFinished {
            ticket,
            result: if succeed {
                Ok(DecryptedMessage {
                    message_id,
                    handle: Handle::new([0; 32]),
                    clear_text: "hi".into(),
                })
            } else {
                Err(failure())
            },
        },
        Action::SwitchNetwork { ticket, params } => Event::SwitchFinished {
            ticket,
            result: if succeed { Ok(params.chain_id) } else { Err(failure()) },
        },
        Action::Publish | Action::RetireInstance | Action::ClearSignatures => return None,
    };
    Some(event)
}

fuzz_target!(|steps: Vec<Step>| {
    let mut orchestrator = Orchestrator::new(OrchestratorConfig::default());
    let registry = InvariantRegistry::standard();
    let mut trace = StatusTrace::new();
    trace.record(orchestrator.snapshot());

    let mut pending: Vec<Action> = Vec::new();
    let mut next_id: MessageId = 0;

    for step in steps {
        let before = orchestrator.snapshot();

        let actions = match step {
            Step::Connected { account: a, chain: c } => orchestrator.handle(Event::Wallet(
                WalletEvent::Connected { accounts: vec![account(a)], chain_id: chain(c) },
            )),
            Step::ChainChanged(c) => {
                orchestrator.handle(Event::Wallet(WalletEvent::ChainChanged(chain(c))))
            },
            Step::AccountsChanged(accounts) => orchestrator.handle(Event::Wallet(
                WalletEvent::AccountsChanged(accounts.into_iter().map(account).collect()),
            )),
            Step::Disconnected => orchestrator.handle(Event::Wallet(WalletEvent::Disconnected)),
            Step::Connect => orchestrator.connect(),
            Step::Send { recipient, text } => {
                let result = orchestrator.send(&account(recipient).to_string(), &text);
                if before.is_sending {
                    assert_eq!(result, Err(OperationError::Rejected(Rejection::SendInFlight)));
                }
                result.unwrap_or_default()
            },
            Step::SendRaw { recipient } => orchestrator.send(&recipient, "hi").unwrap_or_default(),
            Step::Refresh => {
                let result = orchestrator.refresh();
                if before.is_refreshing {
                    assert_eq!(result, Err(OperationError::Rejected(Rejection::RefreshInFlight)));
                }
                result.unwrap_or_default()
            },
            Step::Decrypt(index) => {
                let message_id = before.received.get(usize::from(index)).copied().unwrap_or(999);
                let result = orchestrator.decrypt(message_id);
                if before.is_decrypting {
                    assert_eq!(result, Err(OperationError::Rejected(Rejection::DecryptInFlight)));
                }
                result.unwrap_or_default()
            },
            Step::SwitchNetwork => orchestrator.switch_network().unwrap_or_default(),
            Step::RetryInstance => orchestrator.retry_instance(),
            Step::Complete { index, succeed, ids } => {
                if pending.is_empty() {
                    continue;
                }
                let action = pending.remove(usize::from(index) % pending.len());
                let stale = action.ticket().is_some_and(|t| t.fingerprint.epoch != before.epoch);
                let session_bound = matches!(
                    action,
                    Action::Send { .. } | Action::Refresh { .. } | Action::Decrypt { .. }
                );
                let Some(event) = completion(action, succeed, &ids, &mut next_id) else {
                    continue;
                };
                let actions = orchestrator.handle(event);
                if stale && session_bound {
                    let after = orchestrator.snapshot();
                    assert!(actions.is_empty());
                    assert_eq!(before.sent, after.sent);
                    assert_eq!(before.received, after.received);
                    assert_eq!(before.decrypted, after.decrypted);
                }
                actions
            },
        };

        pending.extend(actions.into_iter().filter(|a| a.ticket().is_some()));
        trace.record(orchestrator.snapshot());
        registry.assert_all(&trace, "after fuzz step");
    }
});
