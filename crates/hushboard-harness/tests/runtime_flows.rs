//! End-to-end runtime flows against the simulated local chain.
//!
//! Each test drives one or more runtimes through real collaborator calls:
//! permits are signed with secp256k1 keys, words are sealed by the local
//! coprocessor and the ledger enforces input proofs and access grants.
//!
//! # Oracle Pattern
//!
//! Tests end with oracle checks on collaborator counters (prompts, ledger
//! calls, encryptions) in addition to the published status, so "nothing
//! happened" is verified at the collaborator, not inferred from state.

use std::collections::BTreeSet;

use hushboard_app::{
    Command, NetworkStatus, OperationError, OrchestratorConfig, Phase, Rejection, SEPOLIA_RPC_URL,
    StatusSnapshot,
};
use hushboard_core::{
    Address, DecryptionSignature, DeploymentTable, FheError, FheInstance, LOCAL_CHAIN_ID,
    MessageLedger, SEPOLIA_CHAIN_ID, SignatureStore, Wallet, WalletEvent,
};
use hushboard_harness::{
    InvariantRegistry, LocalCoprocessor, SIM_EPOCH, SimRuntime, SimWallet, SimWorld, StatusTrace,
};
use tokio::sync::{mpsc, watch};

/// Connect and wait for the FHE instance.
async fn connected(runtime: &mut SimRuntime) {
    runtime.connect();
    runtime.settle().await;
    assert_eq!(runtime.status().phase, Phase::InstanceReady);
}

fn only_account(wallet: &SimWallet) -> Address {
    wallet.accounts()[0]
}

fn record(updates: &mut watch::Receiver<StatusSnapshot>, trace: &mut StatusTrace) {
    if updates.has_changed().unwrap_or(false) {
        trace.record(updates.borrow_and_update().clone());
    }
}

fn serve_sepolia(world: &SimWorld) {
    world
        .sdk()
        .register(SEPOLIA_RPC_URL, LocalCoprocessor::new(SEPOLIA_CHAIN_ID, world.env().clone()));
}

#[tokio::test]
async fn sends_get_unique_chain_assigned_ids() {
    let world = SimWorld::new(1);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;

    for _ in 0..5 {
        runtime.send(&bob.to_string(), "hi").unwrap();
        runtime.settle().await;
    }

    let status = runtime.status();
    assert_eq!(status.sent_count(), 5);
    assert_eq!(status.sent.iter().collect::<BTreeSet<_>>().len(), 5);
    assert_eq!(world.ledger().calls().submit, 5);

    runtime.refresh().unwrap();
    runtime.settle().await;
    assert_eq!(runtime.status().sent, vec![0, 1, 2, 3, 4]);
    assert_eq!(runtime.status().total_count(), 5);
}

#[tokio::test]
async fn send_encrypts_once_and_submits_to_recipient() {
    let world = SimWorld::new(2);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;

    runtime.send(&bob.to_string(), "hi").unwrap();
    runtime.settle().await;

    assert_eq!(world.coprocessor().encryptions(), 1);
    assert_eq!(world.ledger().calls().submit, 1);
    let submissions = world.ledger().submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0, bob);
    assert_eq!(runtime.status().sent_count(), 1);
}

#[tokio::test]
async fn invalid_input_never_reaches_collaborators() {
    let world = SimWorld::new(3);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;

    assert_eq!(
        runtime.send(&bob.to_string(), ""),
        Err(OperationError::Rejected(Rejection::EmptyMessage))
    );
    assert!(matches!(
        runtime.send("0xRecipient", "hi"),
        Err(OperationError::Rejected(Rejection::InvalidRecipient { .. }))
    ));
    assert!(matches!(
        runtime.send(&bob.to_string(), "ninebytes"),
        Err(OperationError::Rejected(Rejection::MessageTooLong { len: 9, max: 8 }))
    ));

    assert_eq!(runtime.in_flight(), 0);
    assert_eq!(world.coprocessor().encryptions(), 0);
    assert_eq!(world.ledger().calls().total(), 0);
    assert!(runtime.status().last_error.is_some());
}

#[tokio::test]
async fn text_with_nul_never_reaches_collaborators() {
    let world = SimWorld::new(11);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;

    for text in ["hi\0", "\0"] {
        assert_eq!(
            runtime.send(&bob.to_string(), text),
            Err(OperationError::Rejected(Rejection::NulInMessage))
        );
    }

    assert_eq!(runtime.in_flight(), 0);
    assert_eq!(world.coprocessor().encryptions(), 0);
    assert_eq!(world.ledger().calls().total(), 0);
    assert!(runtime.status().sent.is_empty());
}

#[tokio::test]
async fn second_send_is_rejected_without_ledger_call() {
    let world = SimWorld::new(4);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;

    runtime.send(&bob.to_string(), "one").unwrap();
    assert!(runtime.status().is_sending);
    assert!(!runtime.status().can_send_message);

    assert_eq!(
        runtime.send(&bob.to_string(), "two"),
        Err(OperationError::Rejected(Rejection::SendInFlight))
    );
    assert_eq!(world.ledger().calls().submit, 0);

    runtime.settle().await;
    assert_eq!(world.ledger().calls().submit, 1);
    assert_eq!(world.coprocessor().encryptions(), 1);
    assert!(runtime.status().can_send_message);
}

#[tokio::test]
async fn decrypts_share_one_signature_prompt() {
    let world = SimWorld::new(5);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));
    let alice_address = only_account(&alice);

    let first = world.post(bob, alice_address, "hello").await.unwrap();
    let second = world.post(bob, alice_address, "again").await.unwrap();

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;
    runtime.refresh().unwrap();
    runtime.settle().await;
    assert_eq!(runtime.status().received, vec![first, second]);

    runtime.decrypt(first).unwrap();
    runtime.settle().await;
    runtime.decrypt(second).unwrap();
    runtime.settle().await;

    // Already decrypted: answered from state, no gateway call
    runtime.decrypt(first).unwrap();
    assert_eq!(runtime.in_flight(), 0);

    let status = runtime.status();
    assert_eq!(status.clear_text(first), Some("hello"));
    assert_eq!(status.clear_text(second), Some("again"));
    assert_eq!(alice.sign_prompts(), 1);
    assert_eq!(world.coprocessor().decryptions(), 2);
    assert_eq!(runtime.executor().signatures().store().len(), Ok(1));
}

#[tokio::test]
async fn round_trip_between_two_runtimes() {
    let world = SimWorld::new(6);
    let alice = world.wallet(1);
    let bob = world.wallet(1);

    let mut sender = world.runtime(&alice);
    let mut reader = world.runtime(&bob);
    connected(&mut sender).await;
    connected(&mut reader).await;

    sender.send(&only_account(&bob).to_string(), "héllo").unwrap();
    sender.settle().await;

    reader.refresh().unwrap();
    reader.settle().await;
    let message_id = reader.status().received[0];
    reader.decrypt(message_id).unwrap();
    reader.settle().await;

    assert_eq!(reader.status().clear_text(message_id), Some("héllo"));
    assert!(reader.status().sent.is_empty());
    assert_eq!(sender.status().sent, vec![message_id]);
}

#[tokio::test]
async fn signature_of_another_user_fails_decryption() {
    let world = SimWorld::new(7);
    let alice = only_account(&world.wallet(1));
    let bob = only_account(&world.wallet(1));
    let carol = world.wallet(1);
    let carol_address = only_account(&carol);

    let message_id = world.post(alice, bob, "secret").await.unwrap();
    let contract = world.ledger().contract();
    let handle = world.ledger().get_handle(contract, message_id).await.unwrap();

    // Carol holds a valid permit of her own, but was never granted the handle
    let coprocessor = world.coprocessor();
    let keypair = coprocessor.generate_keypair();
    let start = SIM_EPOCH;
    let permit = coprocessor.create_permit(&keypair.public_key, &[contract], start, 1);
    carol.request_accounts().await.unwrap();
    let signature = carol.sign_typed_data(carol_address, &permit).await.unwrap();

    let signature = DecryptionSignature {
        contract,
        user: carol_address,
        handles: BTreeSet::new(),
        public_key: keypair.public_key,
        private_key: keypair.private_key,
        signature,
        start_timestamp: start,
        duration_days: 1,
    };

    let result = coprocessor.user_decrypt(handle, contract, &signature).await;
    assert!(matches!(result, Err(FheError::DecryptionFailed { .. })));
}

#[tokio::test]
async fn wrong_network_refresh_makes_no_ledger_call() {
    let world = SimWorld::new(8);
    let wallet = SimWallet::new(1);
    wallet.generate(world.env());

    let mut runtime = world.runtime(&wallet);
    runtime.connect();
    runtime.settle().await;

    assert_eq!(runtime.refresh(), Err(OperationError::WrongNetwork { chain_id: 1 }));

    let status = runtime.status();
    assert_eq!(status.is_deployed, Some(false));
    assert_eq!(status.network, NetworkStatus::WrongNetwork { chain_id: 1 });
    assert!(!status.can_get_messages);
    assert_eq!(status.last_error, None);
    assert_eq!(world.ledger().calls().total(), 0);
}

#[tokio::test]
async fn signing_rejection_is_retryable() {
    let world = SimWorld::new(9);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));
    let message_id = world.post(bob, only_account(&alice), "retry").await.unwrap();

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;
    runtime.refresh().unwrap();
    runtime.settle().await;

    alice.set_reject_signing(true);
    runtime.decrypt(message_id).unwrap();
    runtime.settle().await;

    let status = runtime.status();
    assert_eq!(status.last_error, Some(OperationError::SigningRejected));
    assert!(status.clear_text(message_id).is_none());
    assert!(status.can_decrypt);

    alice.set_reject_signing(false);
    runtime.decrypt(message_id).unwrap();
    runtime.settle().await;

    let status = runtime.status();
    assert_eq!(status.clear_text(message_id), Some("retry"));
    assert!(status.last_error.is_none());
    assert_eq!(alice.sign_prompts(), 2);
}

#[tokio::test]
async fn refused_permit_is_dropped_from_cache() {
    let world = SimWorld::new(21);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));
    let first = world.post(bob, only_account(&alice), "one").await.unwrap();
    let second = world.post(bob, only_account(&alice), "two").await.unwrap();

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;
    runtime.refresh().unwrap();
    runtime.settle().await;

    runtime.decrypt(first).unwrap();
    runtime.settle().await;
    assert_eq!(runtime.executor().signatures().store().len(), Ok(1));

    world.coprocessor().set_refuse_permits(true);
    runtime.decrypt(second).unwrap();
    runtime.settle().await;

    let status = runtime.status();
    assert!(matches!(status.last_error, Some(OperationError::DecryptionFailed { .. })));
    assert!(status.clear_text(second).is_none());
    assert_eq!(runtime.executor().signatures().store().len(), Ok(0));

    // Retry signs a fresh permit instead of replaying the refused one
    world.coprocessor().set_refuse_permits(false);
    runtime.decrypt(second).unwrap();
    runtime.settle().await;

    let status = runtime.status();
    assert_eq!(status.clear_text(second), Some("two"));
    assert_eq!(alice.sign_prompts(), 2);
    assert_eq!(world.coprocessor().decryptions(), 3);
}

#[tokio::test]
async fn missing_contract_code_is_reported_as_network_status() {
    let world = SimWorld::new(10);
    let alice = world.wallet(1);
    world.ledger().set_deployed(false);

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;
    runtime.refresh().unwrap();
    runtime.settle().await;

    let status = runtime.status();
    let contract = world.ledger().contract();
    assert_eq!(status.network, NetworkStatus::ContractMissing { contract });
    assert_eq!(status.is_deployed, Some(false));
    assert_eq!(status.last_error, None);

    // Known missing: later attempts are refused locally
    let calls = world.ledger().calls();
    assert_eq!(runtime.refresh(), Err(OperationError::ContractNotDeployed { contract }));
    assert_eq!(world.ledger().calls(), calls);
}

#[tokio::test]
async fn instance_failure_can_be_retried() {
    let world = SimWorld::new(11);
    let alice = world.wallet(1);
    world.sdk().set_offline(true);

    let mut runtime = world.runtime(&alice);
    runtime.connect();
    runtime.settle().await;
    assert!(matches!(
        runtime.status().phase,
        Phase::InstanceFailed(OperationError::RpcUnavailable { .. })
    ));

    world.sdk().set_offline(false);
    runtime.retry_instance();
    runtime.settle().await;
    assert_eq!(runtime.status().phase, Phase::InstanceReady);
    assert_eq!(world.sdk().derivations(), 2);
}

#[tokio::test]
async fn switch_network_adds_unknown_chain_first() {
    let sepolia_only = OrchestratorConfig {
        deployments: DeploymentTable::sepolia(Address::new([0x5e; 20])),
        ..OrchestratorConfig::default()
    };
    let world = SimWorld::with_config(12, sepolia_only);
    serve_sepolia(&world);
    let alice = world.wallet(1);

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;
    assert_eq!(runtime.status().network, NetworkStatus::WrongNetwork { chain_id: LOCAL_CHAIN_ID });

    runtime.switch_network().unwrap();
    runtime.settle().await;

    let added = alice.added_chains();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].chain_id, SEPOLIA_CHAIN_ID);

    let status = runtime.status();
    assert_eq!(status.session.chain_id, Some(SEPOLIA_CHAIN_ID));
    assert_eq!(status.is_deployed, Some(true));
    assert_eq!(status.phase, Phase::InstanceReady);
}

#[tokio::test]
async fn disconnect_clears_cached_signatures() {
    let world = SimWorld::new(13);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));
    let message_id = world.post(bob, only_account(&alice), "bye").await.unwrap();

    let mut runtime = world.runtime(&alice);
    connected(&mut runtime).await;
    runtime.refresh().unwrap();
    runtime.settle().await;
    runtime.decrypt(message_id).unwrap();
    runtime.settle().await;
    assert_eq!(runtime.executor().signatures().store().len(), Ok(1));

    runtime.apply_wallet_event(WalletEvent::Disconnected);
    runtime.settle().await;

    let status = runtime.status();
    assert_eq!(status.phase, Phase::Disconnected);
    assert!(status.received.is_empty());
    assert!(status.decrypted.is_empty());
    assert_eq!(runtime.executor().signatures().store().is_empty(), Ok(true));
    assert!(runtime.executor().instances().current().is_none());
}

#[tokio::test]
async fn chain_change_mid_decrypt_leaves_cache_empty() {
    let world = SimWorld::new(14);
    serve_sepolia(&world);
    let alice = world.wallet(1);
    let bob = only_account(&world.wallet(1));
    let message_id = world.post(bob, only_account(&alice), "late").await.unwrap();

    let runtime = world.runtime(&alice);
    let mut status = runtime.subscribe();
    let (wallet_tx, wallet_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(16);
    alice.set_event_sink(wallet_tx);

    let decrypt_gate = world.coprocessor().decrypt_gate().clone();
    decrypt_gate.close();

    let driver = async {
        command_tx.send(Command::Connect).await.unwrap();
        status.wait_for(|s| s.phase == Phase::InstanceReady).await.unwrap();

        command_tx.send(Command::Refresh).await.unwrap();
        status.wait_for(|s| s.received.contains(&message_id)).await.unwrap();

        command_tx.send(Command::Decrypt { message_id }).await.unwrap();
        decrypt_gate.arrived(1).await;
        assert!(status.borrow().is_decrypting);

        alice.change_chain(SEPOLIA_CHAIN_ID);
        status.wait_for(|s| s.session.chain_id == Some(SEPOLIA_CHAIN_ID)).await.unwrap();
        decrypt_gate.open();

        alice.clear_event_sink();
        drop(command_tx);
    };

    let (final_status, ()) = tokio::join!(runtime.run(wallet_rx, command_rx), driver);

    assert!(final_status.decrypted.is_empty());
    assert!(!final_status.is_decrypting);
    assert!(final_status.last_error.is_none());
    assert_eq!(final_status.phase, Phase::InstanceReady);
    assert_eq!(world.coprocessor().decryptions(), 1);
    assert_eq!(alice.sign_prompts(), 1);
}

#[tokio::test]
async fn published_snapshots_satisfy_invariants() {
    let world = SimWorld::new(15);
    let alice = world.wallet(2);
    let bob = only_account(&world.wallet(1));
    let [first, second] = [alice.accounts()[0], alice.accounts()[1]];
    world.post(bob, first, "one").await.unwrap();
    world.post(bob, second, "two").await.unwrap();

    let mut runtime = world.runtime(&alice);
    let mut updates = runtime.subscribe();
    let mut trace = StatusTrace::new();
    let invariants = InvariantRegistry::standard();

    connected(&mut runtime).await;
    record(&mut updates, &mut trace);

    runtime.refresh().unwrap();
    runtime.settle().await;
    record(&mut updates, &mut trace);

    let received = runtime.status().received[0];
    runtime.decrypt(received).unwrap();
    runtime.settle().await;
    record(&mut updates, &mut trace);
    assert_eq!(runtime.status().clear_text(received), Some("one"));

    alice.select_account(second);
    runtime.apply_wallet_event(WalletEvent::AccountsChanged(alice.accounts()));
    runtime.settle().await;
    record(&mut updates, &mut trace);
    assert!(runtime.status().decrypted.is_empty());

    runtime.refresh().unwrap();
    runtime.settle().await;
    record(&mut updates, &mut trace);

    let status = runtime.status();
    assert_eq!(status.session.signer, Some(second));
    assert_eq!(status.received.len(), 1);
    assert!(trace.len() >= 4);
    invariants.assert_all(&trace, "after account switch");
}
