//! Contract bindings used by the executors and the bridge orchestrator
//!
//! Only the call and event types are used; calls are encoded here and
//! submitted through [`super::ChainClient`]. `abigen!` also emits contract
//! wrappers, ABI statics and call enums for every binding, none of which are
//! needed, hence the module-wide allow.

#![allow(dead_code)]

use ethers::contract::abigen;

abigen!(
    Erc20,
    r#"[
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
    ]"#
);

abigen!(
    WrappedNative,
    r#"[
        function deposit() external payable
        function withdraw(uint256 wad) external
    ]"#
);

abigen!(
    UniswapV2Router,
    r#"[
        function factory() external view returns (address)
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external returns (uint256[] amounts)
        function addLiquidity(address tokenA, address tokenB, uint256 amountADesired, uint256 amountBDesired, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB, uint256 liquidity)
        function removeLiquidity(address tokenA, address tokenB, uint256 liquidity, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB)
    ]"#
);

abigen!(
    UniswapV2Factory,
    r#"[
        function getPair(address tokenA, address tokenB) external view returns (address pair)
    ]"#
);

abigen!(
    Bridge,
    r#"[
        function initiateTransfer(address token, uint256 amount, uint256 destinationChainId) external returns (uint256 transferId)
        function isTransferReady(uint256 transferId) external view returns (bool)
        function claimTransfer(uint256 transferId) external
        event TransferInitiated(uint256 indexed transferId, address indexed token, uint256 amount, uint256 destinationChainId)
    ]"#
);
