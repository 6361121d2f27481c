use alloy::sol;

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IOApp {
        struct EnforcedOptionParam {
            uint32 eid;
            uint16 msgType;
            bytes options;
        }

        function endpoint() external view returns (address);
        function peers(uint32 eid) external view returns (bytes32);
        function setPeer(uint32 eid, bytes32 peer) external;
        function enforcedOptions(uint32 eid, uint16 msgType) external view returns (bytes memory);
        function setEnforcedOptions(EnforcedOptionParam[] calldata params) external;
    }
);

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ILayerZeroEndpointV2 {
        struct SetConfigParam {
            uint32 eid;
            uint32 configType;
            bytes config;
        }

        function getSendLibrary(address sender, uint32 dstEid) external view returns (address lib);
        function getConfig(address oapp, address lib, uint32 eid, uint32 configType) external view returns (bytes memory config);
        function setConfig(address oapp, address lib, SetConfigParam[] calldata params) external;
    }
);

sol!(
    #[derive(Debug, PartialEq, Eq)]
    struct UlnConfig {
        uint64 confirmations;
        uint8 requiredDVNCount;
        uint8 optionalDVNCount;
        uint8 optionalDVNThreshold;
        address[] requiredDVNs;
        address[] optionalDVNs;
    }
);

/// `msgType` for plain sends in enforced options.
pub const MSG_TYPE_SEND: u16 = 1;

/// Config type id of the ULN config on a message library.
pub const ULN_CONFIG_TYPE: u32 = 2;

/// `requiredDVNCount` meaning "no required verifiers". Zero means "use the
/// library default" instead.
pub const NIL_DVN_COUNT: u8 = u8::MAX;
