use fedstake_core::block::{Block, GenesisSeed, Transaction};
use fedstake_core::identity::{Ed25519Identity, Signer};
use fedstake_core::ledger::{Ledger, CHAIN_FILE};
use fedstake_core::GENESIS_HASH;
use std::fs::{self, OpenOptions};
use std::io::Write;

fn signer(seed: u8) -> Ed25519Identity {
    Ed25519Identity::from_secret([seed; 32]).expect("secret key")
}

fn sealed_next(ledger: &Ledger, signer: &Ed25519Identity, ts: f64) -> Block {
    Block::new(
        ledger.next_index(),
        ledger.last_hash(),
        ts,
        signer.public_id_hex(),
        5.0,
        0.812345678912,
        vec![Transaction::new("train")
            .with("node", signer.public_id_hex())
            .with("loss", 0.0371)],
    )
    .seal(signer)
    .expect("seal")
}

#[test]
fn blocks_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let a = signer(1);
    let b = signer(2);
    {
        let mut ledger = Ledger::open(dir.path()).unwrap();
        let b1 = sealed_next(&ledger, &a, 1_700_000_000.125);
        assert!(ledger.append(b1).unwrap());
        let b2 = sealed_next(&ledger, &b, 1_700_000_002.5);
        assert!(ledger.append(b2).unwrap());
    }

    let reloaded = Ledger::open(dir.path()).unwrap();
    assert_eq!(reloaded.height(), 2);
    assert_eq!(reloaded.skipped_lines(), 0);
    reloaded.validate_chain().unwrap();
    for block in reloaded.blocks() {
        assert!(block.verify());
        assert!(block.verify_signature());
        assert_eq!(block.txs.len(), 1);
    }
    assert_eq!(reloaded.get(2).unwrap().prev_hash, reloaded.get(1).unwrap().hash);
}

#[test]
fn torn_trailing_line_is_skipped_and_log_stays_usable() {
    let dir = tempfile::tempdir().unwrap();
    let a = signer(7);
    let tip = {
        let mut ledger = Ledger::open(dir.path()).unwrap();
        let b1 = sealed_next(&ledger, &a, 10.0);
        ledger.append(b1).unwrap();
        ledger.last_hash().to_string()
    };

    let mut file = OpenOptions::new()
        .append(true)
        .open(dir.path().join(CHAIN_FILE))
        .unwrap();
    file.write_all(br#"{"index":2,"prev_hash":"ab"#).unwrap();
    drop(file);

    let mut ledger = Ledger::open(dir.path()).unwrap();
    assert_eq!(ledger.height(), 1);
    assert_eq!(ledger.skipped_lines(), 1);
    assert_eq!(ledger.last_hash(), tip);

    let b2 = sealed_next(&ledger, &a, 11.0);
    assert!(ledger.append(b2).unwrap());

    let again = Ledger::open(dir.path()).unwrap();
    assert_eq!(again.height(), 2);
    assert_eq!(again.skipped_lines(), 1);
    again.validate_chain().unwrap();
}

#[test]
fn genesis_seed_file_is_used_once() {
    let dir = tempfile::tempdir().unwrap();
    let seed_path = dir.path().join("genesis.json");
    fs::write(&seed_path, r#"{"owner": "ops", "epoch": 1700000000.0}"#).unwrap();
    let data_dir = dir.path().join("chain");

    {
        let mut ledger = Ledger::open(&data_dir).unwrap();
        let seed = Ledger::read_genesis_seed(&seed_path).unwrap();
        assert!(ledger.seed_genesis(&seed).unwrap());
        let b1 = sealed_next(&ledger, &signer(3), 1_700_000_001.0);
        assert_eq!(b1.index, 1);
        assert_eq!(b1.prev_hash, GENESIS_HASH);
        assert!(ledger.append(b1).unwrap());
    }

    let mut ledger = Ledger::open(&data_dir).unwrap();
    let other = GenesisSeed {
        owner: "someone-else".into(),
        epoch: 0.0,
    };
    assert!(!ledger.seed_genesis(&other).unwrap());
    assert_eq!(ledger.height(), 2);
    let genesis = ledger.get(0).unwrap();
    assert!(genesis.is_genesis());
    assert_eq!(genesis.proposer, "ops");
    ledger.validate_chain().unwrap();
}

#[test]
fn stale_append_is_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let a = signer(9);
    let mut ledger = Ledger::open(dir.path()).unwrap();
    let b1 = sealed_next(&ledger, &a, 1.0);
    let fork = b1.clone();
    assert!(ledger.append(b1).unwrap());
    assert!(!ledger.append(fork).unwrap());

    let reloaded = Ledger::open(dir.path()).unwrap();
    assert_eq!(reloaded.height(), 1);
}
