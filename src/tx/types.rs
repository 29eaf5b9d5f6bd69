//! Transaction values handled by the sender and its policies

use crate::chain::GasPrice;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature, H256, U256};

/// One intended on-chain effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl TxRequest {
    pub fn new(to: Address) -> Self {
        Self {
            to,
            value: U256::zero(),
            data: Bytes::default(),
        }
    }

    pub fn value<T: Into<U256>>(mut self, value: T) -> Self {
        self.value = value.into();
        self
    }

    pub fn data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = data.into();
        self
    }
}

/// Requests batched into one transaction, plus any gas settings to preserve
/// when the transaction is rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRequests {
    pub calls: Vec<TxRequest>,
    pub gas_limit: Option<U256>,
    pub gas_price: Option<GasPrice>,
}

impl TxRequests {
    pub fn new(calls: Vec<TxRequest>) -> Self {
        Self {
            calls,
            ..Default::default()
        }
    }

    /// Recover the requests a transaction was built from, pinning its gas
    /// limit and price so a rebuild reproduces them.
    pub fn from_tx(tx: &Transaction) -> Self {
        Self {
            calls: tx.requests().to_vec(),
            gas_limit: tx.gas_limit(),
            gas_price: Some(tx.gas_price()),
        }
    }
}

/// A transaction owned by one send.
///
/// Values are never mutated in place: `with_nonce` and `with_gas_price` hand
/// back a new, unsigned transaction that must go through a factory before it
/// can be broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    inner: TypedTransaction,
    signature: Option<Signature>,
    requests: Vec<TxRequest>,
}

impl Transaction {
    pub fn signed(inner: TypedTransaction, signature: Signature, requests: Vec<TxRequest>) -> Self {
        Self {
            inner,
            signature: Some(signature),
            requests,
        }
    }

    pub fn unsigned(inner: TypedTransaction, requests: Vec<TxRequest>) -> Self {
        Self {
            inner,
            signature: None,
            requests,
        }
    }

    pub fn inner(&self) -> &TypedTransaction {
        &self.inner
    }

    pub fn requests(&self) -> &[TxRequest] {
        &self.requests
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn nonce(&self) -> u64 {
        self.inner.nonce().map(|n| n.as_u64()).unwrap_or_default()
    }

    pub fn gas_limit(&self) -> Option<U256> {
        self.inner.gas().copied()
    }

    pub fn gas_price(&self) -> GasPrice {
        match &self.inner {
            TypedTransaction::Eip1559(req) => GasPrice::Eip1559 {
                max_fee_per_gas: req.max_fee_per_gas.unwrap_or_default(),
                max_priority_fee_per_gas: req.max_priority_fee_per_gas.unwrap_or_default(),
            },
            other => GasPrice::Legacy(other.gas_price().unwrap_or_default()),
        }
    }

    /// Network hash once signed, signing hash before that
    pub fn hash(&self) -> H256 {
        match &self.signature {
            Some(signature) => self.inner.hash(signature),
            None => self.inner.sighash(),
        }
    }

    /// RLP encoding ready for `eth_sendRawTransaction`
    pub fn raw(&self) -> Option<Bytes> {
        self.signature
            .as_ref()
            .map(|signature| self.inner.rlp_signed(signature))
    }

    pub fn with_nonce(&self, nonce: u64) -> Self {
        let mut inner = self.inner.clone();
        inner.set_nonce(nonce);
        Self::unsigned(inner, self.requests.clone())
    }

    pub fn with_gas_price(&self, gas_price: GasPrice) -> Self {
        let mut inner = self.inner.clone();
        match (&mut inner, gas_price) {
            (
                TypedTransaction::Eip1559(req),
                GasPrice::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                },
            ) => {
                req.max_fee_per_gas = Some(max_fee_per_gas);
                req.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
            }
            (TypedTransaction::Eip1559(req), GasPrice::Legacy(price)) => {
                req.max_fee_per_gas = Some(price);
                req.max_priority_fee_per_gas = Some(price);
            }
            (other, price) => {
                other.set_gas_price(price.max_fee());
            }
        }
        Self::unsigned(inner, self.requests.clone())
    }
}
