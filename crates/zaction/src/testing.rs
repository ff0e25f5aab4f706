//! Shared test fixtures.

use pasta_curves::Fp;
use rand::{SeedableRng as _, rngs::StdRng};
use serde_json::json;

use crate::{
    address::Address,
    builder::BuildError,
    bundle::UnprovenBundle,
    chain::MemoryChain,
    circuit::{ActionWitness, Instance, SpendWitness},
    config::Settings,
    custody::Local,
    descriptor::{
        PermissionLevel, RequestEntry, TransactionRequest, TransparentAction, Word, ZActionDesc, ZActionType,
    },
    keys::{SpendAuthRandomizer, private::SpendingKey},
    name::Symbol,
    note::{Memo, Note},
    note_encryption::encrypt,
    proof_store::{MemoryProofStore, ProofChannel},
    prover::{MockProver, ProverPool},
    transaction::{Transaction, TransactionError},
    tree::{Anchor, MerklePath, empty_root},
    value::{AssetId, NoteKind, ValueBalance, ValueBase, ValueCommitTrapdoor},
    wallet::Wallet,
};

pub(crate) const SEED: &str = "this is the sender's wallet seed phrase";
const RECIPIENT_SEED: &str = "this is the recipient's wallet seed phrase";

pub(crate) fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub(crate) fn eos() -> AssetId {
    AssetId::fungible(Symbol::new("EOS", 4).unwrap(), "eosio.token".parse().unwrap())
}

pub(crate) fn balance_of(value: i64) -> ValueBalance {
    let mut balance = ValueBalance::default();
    balance.add(ValueBase::Fungible(eos()), value).unwrap();
    balance
}

/// `alice@active`.
pub(crate) fn auth() -> Vec<PermissionLevel> {
    vec![PermissionLevel {
        actor: "alice".parse().unwrap(),
        permission: "active".parse().unwrap(),
    }]
}

pub(crate) fn services() -> (ProverPool<MockProver>, ProofChannel<MemoryProofStore>) {
    (
        ProverPool::from_settings(
            MockProver::new(),
            &Settings {
                prover_threads: Some(2),
                ..Settings::default()
            },
        ),
        ProofChannel::new(MemoryProofStore::new()),
    )
}

/// An EOS descriptor.
pub(crate) fn desc(za_type: u64, to: &str, amount: u64) -> ZActionDesc {
    ZActionDesc {
        za_type,
        to: to.to_owned(),
        d1: Word::from(amount),
        d2: Word::from("4,EOS"),
        sc: Word::from("eosio.token"),
        memo: "This is a test!".to_owned(),
        change_to: None,
    }
}

/// One ledger action carrying `descs`.
pub(crate) fn request_for(descs: &[ZActionDesc]) -> TransactionRequest {
    TransactionRequest(vec![RequestEntry {
        action: TransparentAction {
            account: "eosio.token".parse().unwrap(),
            name: "transfer".parse().unwrap(),
            authorization: auth(),
            data: json!({ "from": "alice", "to": "bob", "quantity": "1.0000 EOS", "memo": "" }),
        },
        zaction_descs: descs.to_vec(),
    }])
}

pub(crate) fn recipient_wallet() -> Wallet {
    Wallet::new(RECIPIENT_SEED).unwrap()
}

/// A 100 EOS note spent into 30 out and 70 change, on a one-leaf tree.
pub(crate) fn transfer_circuits(seed: u64) -> (Anchor, Vec<(ActionWitness, Instance)>) {
    let mut rng = rng(seed);
    let sk = SpendingKey::from([5u8; 32]);
    let pak = sk.proof_authorizing_key();
    let own = pak.incoming_viewing_key().address(sk.diversifier_key().diversifier(0));
    let to = recipient_wallet().address(0);

    let mut spent = Note::new(own, NoteKind::Fungible, eos(), 100, Memo::EMPTY, &mut rng);
    spent.position = Some(0);
    let siblings: Vec<Fp> = (0u8..32).map(empty_root).collect();
    let path = MerklePath::from_parts(0, siblings);
    let anchor = path.root(spent.commitment());

    let witness = ActionWitness {
        spend: Some(SpendWitness { note: spent, path, pak }),
        output: Some(Note::new(to, NoteKind::Fungible, eos(), 30, Memo::EMPTY, &mut rng)),
        change: Some(Note::new(own, NoteKind::Fungible, eos(), 70, Memo::EMPTY, &mut rng)),
        alpha: SpendAuthRandomizer::random(&mut rng),
        rcv: ValueCommitTrapdoor::random(&mut rng),
    };
    let instance = witness.instance(ZActionType::TransferFt, None).unwrap();
    (anchor, vec![(witness, instance)])
}

/// A synced wallet holding one EOS note per amount at address 0.
pub(crate) struct Funded {
    pub wallet: Wallet,
    pub chain: MemoryChain,
    pub recipient: Address,
}

pub(crate) async fn funded(amounts: &[u64]) -> Funded {
    funded_with(amounts, Settings::default()).await
}

pub(crate) async fn funded_with(amounts: &[u64], settings: Settings) -> Funded {
    let mut wallet = Wallet::new(SEED).unwrap().with_settings(settings);
    let chain = MemoryChain::new();
    let mut rng = rng(u64::from(u32::MAX));
    for amount in amounts {
        let note = Note::new(wallet.address(0), NoteKind::Fungible, eos(), *amount, Memo::EMPTY, &mut rng);
        chain.add_note(note.commitment(), encrypt(&note, &mut rng).unwrap());
    }
    assert_eq!(wallet.sync(&chain).await.unwrap(), amounts.len());
    Funded {
        wallet,
        chain,
        recipient: recipient_wallet().address(0),
    }
}

impl Funded {
    pub(crate) fn custody(&self) -> Local {
        self.wallet.custody()
    }

    /// Send `amount` EOS to the recipient.
    pub(crate) fn transfer(&self, amount: u64) -> TransactionRequest {
        request_for(&[desc(ZActionType::TransferFt.code(), &self.recipient.to_string(), amount)])
    }

    /// Build without proving, change to address 0.
    pub(crate) async fn build(
        &self,
        request: &TransactionRequest,
        rng: &mut StdRng,
    ) -> Result<UnprovenBundle, BuildError> {
        let descs: Vec<ZActionDesc> = request.descriptors().cloned().collect();
        self.wallet
            .builder(&self.chain, self.wallet.address(0))
            .build(&descs, rng)
            .await
    }

    pub(crate) async fn send(
        &mut self,
        amount: u64,
        prover: &ProverPool<MockProver>,
        proofs: &ProofChannel<MemoryProofStore>,
        rng: &mut StdRng,
    ) -> Result<Transaction, TransactionError> {
        let request = self.transfer(amount);
        self.wallet
            .create_transaction(&request, &auth(), &self.chain, prover, proofs, rng)
            .await
    }
}

