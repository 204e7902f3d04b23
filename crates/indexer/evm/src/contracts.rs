use alloy::sol;

sol! {
    /// The stablecoin every claim, donation and beneficiary transfer is denominated in.
    #[derive(Debug)]
    contract Token {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

sol! {
    /// Current community contract.
    #[derive(Debug)]
    contract CommunityV2 {
        event BeneficiaryAdded(address indexed manager, address indexed beneficiary);
        event BeneficiaryRemoved(address indexed manager, address indexed beneficiary);
        event BeneficiaryClaim(address indexed beneficiary, uint256 amount);
        event ManagerAdded(address indexed manager, address indexed account);
        event ManagerRemoved(address indexed manager, address indexed account);
        event ManagerAddedToBlockList(address indexed manager);
        event ManagerRemovedFromBlockList(address indexed manager);
        event BeneficiaryParamsUpdated(
            uint256 oldClaimAmount,
            uint256 oldMaxClaim,
            uint256 oldDecreaseStep,
            uint256 oldBaseInterval,
            uint256 oldIncrementInterval,
            uint256 newClaimAmount,
            uint256 newMaxClaim,
            uint256 newDecreaseStep,
            uint256 newBaseInterval,
            uint256 newIncrementInterval
        );
        event CommunityLocked(address indexed manager);
        event CommunityUnlocked(address indexed manager);
    }
}

sol! {
    /// First generation community contract. Events do not name the acting manager.
    #[derive(Debug)]
    contract CommunityV1 {
        event ManagerAdded(address indexed _account);
        event ManagerRemoved(address indexed _account);
        event BeneficiaryAdded(address indexed _account);
        event BeneficiaryRemoved(address indexed _account);
        event BeneficiaryClaim(address indexed _account, uint256 _amount);
        event CommunityEdited(
            uint256 _claimAmount,
            uint256 _maxClaim,
            uint256 _baseInterval,
            uint256 _incrementInterval
        );
        event CommunityLocked(address indexed _by);
        event CommunityUnlocked(address indexed _by);
    }
}

sol! {
    #[derive(Debug)]
    contract CommunityAdmin {
        event CommunityAdded(
            address indexed communityAddress,
            address[] managers,
            uint256 claimAmount,
            uint256 maxClaim,
            uint256 decreaseStep,
            uint256 baseInterval,
            uint256 incrementInterval,
            uint256 minTranche,
            uint256 maxTranche
        );
        event CommunityRemoved(address indexed communityAddress);
        event CommunityMigrated(
            address[] managers,
            address indexed communityAddress,
            address indexed previousCommunityAddress
        );

        function addCommunity(
            address[] memory managers,
            uint256 claimAmount,
            uint256 maxClaim,
            uint256 decreaseStep,
            uint256 baseInterval,
            uint256 incrementInterval,
            uint256 minTranche,
            uint256 maxTranche
        ) external;
    }
}

sol! {
    #[derive(Debug)]
    contract Governance {
        event ProposalCreated(
            uint256 id,
            address proposer,
            address[] targets,
            uint256[] values,
            string[] signatures,
            bytes[] calldatas,
            uint256 startBlock,
            uint256 endBlock,
            string description
        );
        event ProposalCanceled(uint256 id);
        event ProposalQueued(uint256 id, uint256 eta);
        event ProposalExecuted(uint256 id);
    }
}

sol! {
    /// Read-only view of a community's claim parameters.
    #[sol(rpc)]
    interface ICommunity {
        function claimAmount() external view returns (uint256);
        function maxClaim() external view returns (uint256);
        function decreaseStep() external view returns (uint256);
        function baseInterval() external view returns (uint256);
        function incrementInterval() external view returns (uint256);
    }
}
