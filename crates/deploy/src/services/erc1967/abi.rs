//! Calldata for ERC-1967 proxies and UUPS upgrades.

use alloy_core::{
    primitives::{Address, B256, Bytes, b256, keccak256},
    sol_types::SolValue,
};

/// `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`
pub const IMPLEMENTATION_SLOT: B256 =
    b256!("0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// Initializer called through the proxy constructor.
pub const INITIALIZER_SIGNATURE: &str = "initialize(address[])";

/// UUPS upgrade entry point, called on the proxy.
pub const UPGRADE_SIGNATURE: &str = "upgradeToAndCall(address,bytes)";

/// The 4-byte function selector for `signature`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn with_selector(signature: &str, params: Vec<u8>) -> Bytes {
    let mut data = Vec::with_capacity(4 + params.len());
    data.extend_from_slice(&selector(signature));
    data.extend(params);
    data.into()
}

/// `initialize(address[] admins)`
pub fn initialize_calldata(admins: &[Address]) -> Bytes {
    with_selector(INITIALIZER_SIGNATURE, (admins.to_vec(),).abi_encode_params())
}

/// `upgradeToAndCall(newImplementation, "")`
pub fn upgrade_calldata(new_implementation: Address) -> Bytes {
    with_selector(
        UPGRADE_SIGNATURE,
        (new_implementation, Bytes::new()).abi_encode_params(),
    )
}

/// Creation code for `ERC1967Proxy(implementation, data)`.
pub fn proxy_deploy_code(proxy_bytecode: &Bytes, implementation: Address, init: Bytes) -> Bytes {
    let mut code = proxy_bytecode.to_vec();
    code.extend((implementation, init).abi_encode_params());
    code.into()
}

/// Extract the address held in the low 20 bytes of a storage word.
pub fn address_from_slot(word: B256) -> Address {
    Address::from_word(word)
}
