//! Bundle builder.
//!
//! Turns caller descriptors into an [`UnprovenBundle`]:
//!
//! 1. parse every descriptor before touching any note,
//! 2. reserve the notes each spend needs through the [`NoteStore`],
//! 3. fetch the anchor once, then every spent note's path, which must hash
//!    to that anchor,
//! 4. plan the actions of each descriptor and encrypt their outputs,
//! 5. pad with zero-value `Null` actions to a configured bundle size,
//! 6. check that action nets and public values agree per asset.
//!
//! A fungible spend of several notes takes one action per note. Each moves
//! its note's full value except the last, which also returns the change.
//! Auth tokens are minted without public value and burned by commitment.
//! Any error drops the reservation, releasing every note.

use core::ops::Range;

use rand::{CryptoRng, RngCore};
use tracing::{debug, info};

use crate::{
    action::UnprovenAction,
    address::{Address, AddressDecodeError},
    bundle::UnprovenBundle,
    chain::ChainReader,
    circuit::{ActionWitness, PublicValue, SpendWitness},
    config::Settings,
    descriptor::{Descriptor, DescriptorError, Recipient, UnsupportedType, ZActionDesc, ZActionType},
    keys::{ProofAuthorizingKey, SpendAuthRandomizer},
    note::{Memo, Note},
    note_encryption::{self, EncryptionError},
    note_store::{InsufficientFunds, NoteStore, Reservation},
    tree::{Anchor, TreeClient, TreeError},
    value::{NoteKind, ValueBalance, ValueBase, ValueCommitTrapdoor, ValueOverflow},
};

/// The bundle could not be built. Nothing stays reserved.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The wallet cannot cover a descriptor.
    #[error(transparent)]
    InsufficientFunds(#[from] InsufficientFunds),

    /// A spent note's path does not hash to the build's anchor: the tree
    /// moved while paths were fetched.
    #[error("merkle path does not hash to anchor {anchor}")]
    AnchorMismatch {
        /// The anchor fetched for this build.
        anchor: Anchor,
    },

    /// A descriptor names no supported operation.
    #[error("unsupported descriptor type {0}")]
    UnsupportedDescriptorType(u64),

    /// A descriptor address did not decode.
    #[error("bad address {text:?}: {source}")]
    AddressDecodeError {
        /// The offending text.
        text: String,
        /// Why it failed.
        source: AddressDecodeError,
    },

    /// Any other malformed descriptor field.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(DescriptorError),

    /// A descriptor's destination does not fit its type.
    #[error("{0} descriptor has no valid destination")]
    RecipientMismatch(ZActionType),

    /// The commitment tree could not be read.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// A value left `i64` range.
    #[error(transparent)]
    ValueOverflow(#[from] ValueOverflow),

    /// An output could not be encrypted.
    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    /// Action nets disagree with the public value balance, or a public
    /// value sits on an action that moves none.
    #[error("bundle does not balance")]
    Unbalanced,
}

impl From<DescriptorError> for BuildError {
    fn from(err: DescriptorError) -> Self {
        match err {
            DescriptorError::UnsupportedType(UnsupportedType(code)) => Self::UnsupportedDescriptorType(code),
            DescriptorError::Address { text, source } => Self::AddressDecodeError { text, source },
            other @ (DescriptorError::Name(_)
            | DescriptorError::Commitment(_)
            | DescriptorError::Number { .. }
            | DescriptorError::ZeroAmount
            | DescriptorError::Memo(_)) => Self::InvalidDescriptor(other),
        }
    }
}

/// Builds unproven bundles from one wallet's notes.
#[derive(Debug)]
pub struct Builder<'wallet, C: ?Sized> {
    store: &'wallet NoteStore,
    tree: TreeClient<'wallet, C>,
    settings: &'wallet Settings,
    pak: ProofAuthorizingKey,
    change: Address,
}

/// One descriptor with the notes reserved for it.
struct Planned {
    desc: Descriptor,
    spent: Vec<Note>,
}

impl<'wallet, C: ChainReader + ?Sized> Builder<'wallet, C> {
    /// A builder spending from `store`, proving with `pak` and returning
    /// change to `change` unless a descriptor redirects it.
    pub const fn new(
        store: &'wallet NoteStore,
        chain: &'wallet C,
        settings: &'wallet Settings,
        pak: ProofAuthorizingKey,
        change: Address,
    ) -> Self {
        Self {
            store,
            tree: TreeClient::new(chain),
            settings,
            pak,
            change,
        }
    }

    fn reserve(&self, desc: &Descriptor) -> Result<Reservation, BuildError> {
        let reserved = match desc.za_type {
            ZActionType::Null | ZActionType::MintFt | ZActionType::MintNft | ZActionType::MintAuth => {
                Reservation::empty(self.store)
            }
            ZActionType::TransferFt | ZActionType::BurnFt => {
                self.store.select(&desc.asset, desc.value, self.settings.selection)?
            }
            ZActionType::TransferNft | ZActionType::BurnNft => self.store.select_nft(&desc.asset, desc.value)?,
            ZActionType::BurnAuth => {
                let Recipient::AuthToken(cm) = desc.recipient else {
                    return Err(BuildError::RecipientMismatch(desc.za_type));
                };
                self.store.select_auth(&desc.asset, &cm)?
            }
        };
        Ok(reserved)
    }

    /// Build a bundle executing `descs` in order.
    pub async fn build<R: RngCore + CryptoRng + Send>(
        &self,
        descs: &[ZActionDesc],
        rng: &mut R,
    ) -> Result<UnprovenBundle, BuildError> {
        let parsed = descs
            .iter()
            .map(|desc| Descriptor::parse_with(desc, self.settings))
            .collect::<Result<Vec<_>, _>>()?;

        let mut reservation = Reservation::empty(self.store);
        let mut planned = Vec::with_capacity(parsed.len());
        for desc in parsed {
            let reserved = self.reserve(&desc)?;
            planned.push(Planned {
                desc,
                spent: reserved.notes().to_vec(),
            });
            reservation.absorb(reserved);
        }

        let anchor = self.tree.root().await?;
        let mut spends: Vec<Vec<SpendWitness>> = Vec::with_capacity(planned.len());
        for entry in &planned {
            let mut witnesses = Vec::with_capacity(entry.spent.len());
            for note in &entry.spent {
                let position = note.position.ok_or(BuildError::AnchorMismatch { anchor })?;
                let path = self.tree.path(position).await?;
                if path.root(note.commitment()) != anchor {
                    return Err(BuildError::AnchorMismatch { anchor });
                }
                witnesses.push(SpendWitness {
                    note: *note,
                    path,
                    pak: self.pak,
                });
            }
            spends.push(witnesses);
        }

        let mut actions = Vec::new();
        let mut spans: Vec<Range<usize>> = Vec::with_capacity(planned.len());
        let mut own_outputs = Vec::new();
        for (entry, witnesses) in planned.iter().zip(spends) {
            let start = actions.len();
            self.plan(&entry.desc, witnesses, &mut actions, &mut own_outputs, rng)?;
            debug!(za_type = %entry.desc.za_type, actions = actions.len() - start, "planned descriptor");
            spans.push(start..actions.len());
        }

        let real = actions.len();
        let padded = self.settings.padded_len(real);
        while actions.len() < padded {
            actions.push(action(ZActionType::Null, None, None, None, None, rng)?);
        }

        let value_balance = public_balance(&actions)?;
        if net_balance(&actions)? != value_balance {
            return Err(BuildError::Unbalanced);
        }

        info!(
            descriptors = spans.len(),
            actions = real,
            padded,
            spent = reservation.notes().len(),
            %anchor,
            "built bundle"
        );
        Ok(UnprovenBundle {
            anchor,
            actions,
            value_balance,
            spans,
            own_outputs,
            reservation,
        })
    }

    /// Append the actions of one descriptor.
    fn plan<R: RngCore + CryptoRng>(
        &self,
        desc: &Descriptor,
        spends: Vec<SpendWitness>,
        actions: &mut Vec<UnprovenAction>,
        own_outputs: &mut Vec<Note>,
        rng: &mut R,
    ) -> Result<(), BuildError> {
        let za_type = desc.za_type;
        let (recipient, account) = match desc.recipient {
            Recipient::Shielded(address) if za_type.has_output() => (Some(address), None),
            Recipient::Ledger(name) if za_type.is_public() && !za_type.has_output() => (None, Some(name)),
            Recipient::AuthToken(_) if za_type == ZActionType::BurnAuth => (None, None),
            Recipient::Shielded(_) | Recipient::Ledger(_) | Recipient::AuthToken(_) => {
                return Err(BuildError::RecipientMismatch(za_type));
            }
        };
        let change_to = desc.change_to.unwrap_or(self.change);

        match za_type {
            ZActionType::Null => Err(BuildError::UnsupportedDescriptorType(za_type.code())),
            ZActionType::MintFt | ZActionType::MintNft | ZActionType::MintAuth => {
                let to = recipient.ok_or(BuildError::RecipientMismatch(za_type))?;
                let public = match za_type.kind() {
                    NoteKind::Fungible => Some((ValueBase::Fungible(desc.asset), desc.value)),
                    NoteKind::NonFungible => Some((ValueBase::NonFungible(desc.asset, desc.value), 1)),
                    NoteKind::Auth => None,
                }
                .map(|(base, amount)| PublicValue {
                    base,
                    amount,
                    account: None,
                    memo: desc.memo,
                });
                let output = Note::new(to, za_type.kind(), desc.asset, desc.value, desc.memo, &mut *rng);
                actions.push(action(za_type, None, Some(output), None, public, rng)?);
                Ok(())
            }
            ZActionType::BurnAuth => {
                for spend in spends {
                    actions.push(action(za_type, Some(spend), None, None, None, rng)?);
                }
                Ok(())
            }
            ZActionType::TransferNft | ZActionType::BurnNft => {
                for spend in spends {
                    let token = spend.note.amount;
                    let output = recipient
                        .map(|to| Note::new(to, NoteKind::NonFungible, desc.asset, token, desc.memo, &mut *rng));
                    let public = account.map(|name| PublicValue {
                        base: ValueBase::NonFungible(desc.asset, token),
                        amount: 1,
                        account: Some(name),
                        memo: desc.memo,
                    });
                    actions.push(action(za_type, Some(spend), output, None, public, rng)?);
                }
                Ok(())
            }
            ZActionType::TransferFt | ZActionType::BurnFt => {
                let total = spends
                    .iter()
                    .try_fold(0u64, |acc, spend| acc.checked_add(spend.note.amount))
                    .ok_or(ValueOverflow(ValueBase::Fungible(desc.asset)))?;
                if total < desc.value {
                    return Err(InsufficientFunds {
                        asset: desc.asset,
                        need: desc.value,
                        have: total,
                    }
                    .into());
                }
                let mut remaining = desc.value;
                for spend in spends {
                    let moved = spend.note.amount.min(remaining);
                    let returned = spend.note.amount - moved;
                    remaining -= moved;
                    let change_note = (returned > 0).then(|| {
                        Note::new(change_to, NoteKind::Fungible, desc.asset, returned, Memo::EMPTY, &mut *rng)
                    });
                    if desc.change_to.is_none() {
                        own_outputs.extend(change_note);
                    }
                    let output = recipient
                        .map(|to| Note::new(to, NoteKind::Fungible, desc.asset, moved, desc.memo, &mut *rng));
                    let public = account.map(|name| PublicValue {
                        base: ValueBase::Fungible(desc.asset),
                        amount: moved,
                        account: Some(name),
                        memo: desc.memo,
                    });
                    actions.push(action(za_type, Some(spend), output, change_note, public, rng)?);
                }
                Ok(())
            }
        }
    }
}

/// One action with fresh randomness and encrypted outputs.
fn action<R: RngCore + CryptoRng>(
    za_type: ZActionType,
    spend: Option<SpendWitness>,
    output: Option<Note>,
    change: Option<Note>,
    public: Option<PublicValue>,
    rng: &mut R,
) -> Result<UnprovenAction, BuildError> {
    let witness = ActionWitness {
        spend,
        output,
        change,
        alpha: SpendAuthRandomizer::random(&mut *rng),
        rcv: ValueCommitTrapdoor::random(&mut *rng),
    };
    let instance = witness.instance(za_type, public)?;
    let ciphertexts = output
        .iter()
        .chain(change.iter())
        .map(|note| note_encryption::encrypt(note, &mut *rng))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(UnprovenAction {
        instance,
        witness,
        ciphertexts,
    })
}

/// Public values per base: burns positive, mints negative.
fn public_balance(actions: &[UnprovenAction]) -> Result<ValueBalance, BuildError> {
    let mut balance = ValueBalance::default();
    for unproven in actions {
        let Some(public) = unproven.instance.public_value else {
            continue;
        };
        let amount = i64::try_from(public.amount).map_err(|_err| ValueOverflow(public.base))?;
        let delta = match unproven.instance.za_type {
            ZActionType::MintFt | ZActionType::MintNft => -amount,
            ZActionType::BurnFt | ZActionType::BurnNft => amount,
            ZActionType::Null
            | ZActionType::MintAuth
            | ZActionType::TransferFt
            | ZActionType::TransferNft
            | ZActionType::BurnAuth => {
                return Err(BuildError::Unbalanced);
            }
        };
        balance.add(public.base, delta)?;
    }
    Ok(balance)
}

/// Action nets per base, from the witnesses.
fn net_balance(actions: &[UnprovenAction]) -> Result<ValueBalance, BuildError> {
    let mut balance = ValueBalance::default();
    for unproven in actions {
        let base = unproven
            .witness
            .value_base(unproven.instance.public_value.as_ref());
        balance.add(base, unproven.witness.net_value()?)?;
    }
    Ok(balance)
}
