use ethers::prelude::abigen;

abigen!(
    IPixotchiNFT,
    r#"[
        function getPlantName(uint256 id) external view returns (string)
    ]"#
);
