//! Solidity interface of the dual-VM token.
//!
//! Every operation that takes an account is overloaded once per address space:
//! `address` parameters are EVM addresses, `uint256` parameters are Starknet
//! felts. `alloy` suffixes overloads in declaration order (`transfer_0` takes an
//! `address`, `transfer_1` a felt, and so on).

use alloy::sol;

sol! {
    /// Dual address-space token interface
    interface IDualVmToken {
        /// Emitted on every balance movement, keyed by canonical felts.
        event Transfer(uint256 indexed from, uint256 indexed to, uint256 value);

        /// Emitted on every allowance update, keyed by canonical felts.
        event Approval(uint256 indexed owner, uint256 indexed spender, uint256 value);

        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);

        function balanceOf(address account) external view returns (uint256);
        function balanceOf(uint256 starknetAccount) external view returns (uint256);

        function allowance(address owner, address spender) external view returns (uint256);
        function allowance(address owner, uint256 spender) external view returns (uint256);

        function transfer(address to, uint256 amount) external returns (bool);
        function transfer(uint256 to, uint256 amount) external returns (bool);

        function approve(address spender, uint256 amount) external returns (bool);
        function approve(uint256 spender, uint256 amount) external returns (bool);

        /// EVM owner, EVM recipient.
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        /// Starknet owner, EVM recipient.
        function transferFrom(uint256 from, address to, uint256 amount) external returns (bool);
        /// EVM owner, Starknet recipient.
        function transferFrom(address from, uint256 to, uint256 amount) external returns (bool);
        /// Starknet owner, Starknet recipient.
        function transferFrom(uint256 from, uint256 to, uint256 amount) external returns (bool);

        /// Starknet address backing an EVM account.
        function starknetAddressOf(address account) external view returns (uint256);
        /// EVM address registered for a Starknet account, zero if none.
        function evmAddressOf(uint256 starknetAccount) external view returns (address);
    }
}
