//! `DataLogger` contract ABI and transaction input inspection.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use serde::{Deserialize, Serialize};

sol! {
    /// On-chain data record.
    #[sol(all_derives)]
    struct DataRecord {
        uint256 id;
        address sender;
        string category;
        string data;
        uint256 timestamp;
        uint256 blockNumber;
    }

    /// On-chain payment record.
    #[sol(all_derives)]
    struct TransactionRecord {
        uint256 id;
        address from;
        address to;
        uint256 amount;
        string memo;
        uint256 timestamp;
        uint256 blockNumber;
    }

    #[sol(all_derives)]
    interface IDataLogger {
        event DataStored(
            uint256 indexed recordId,
            address indexed sender,
            string indexed category,
            string data,
            uint256 timestamp
        );

        event TransactionLogged(
            uint256 indexed recordId,
            address indexed from,
            address indexed to,
            uint256 amount,
            string memo,
            uint256 timestamp
        );

        function logData(string category, string data) external;
        function logWithPayment(address to, string memo) external payable;
        function getUserDataRecordIds(address user) external view returns (uint256[] memory);
        function getUserTransactionRecordIds(address user) external view returns (uint256[] memory);
        function getDataRecord(uint256 id) external view returns (DataRecord memory);
        function getTransactionRecord(uint256 id) external view returns (TransactionRecord memory);
        function getRecordCounts() external view returns (uint256 dataCount, uint256 txCount);
    }
}

/// Topic under which an indexed `category` string is stored.
///
/// Indexed strings are hashed, so events carry `keccak256(category)` rather than
/// the string itself.
pub fn data_category_topic(category: &str) -> B256 {
    keccak256(category.as_bytes())
}

/// Topic0 values of both contract events.
pub fn event_signatures() -> [B256; 2] {
    [
        IDataLogger::DataStored::SIGNATURE_HASH,
        IDataLogger::TransactionLogged::SIGNATURE_HASH,
    ]
}

/// Well-known selectors outside this contract.
const KNOWN_SELECTORS: &[([u8; 4], &str)] = &[
    ([0xa9, 0x05, 0x9c, 0xbb], "transfer(address,uint256)"),
    ([0x09, 0x5e, 0xa7, 0xb3], "approve(address,uint256)"),
    ([0x23, 0xb8, 0x72, 0xdd], "transferFrom(address,address,uint256)"),
    ([0x70, 0xa0, 0x82, 0x31], "balanceOf(address)"),
    ([0x18, 0x16, 0x0d, 0xdd], "totalSupply()"),
];

/// Human-readable interpretation of transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ParsedInput {
    Empty,
    /// Input is a readable message.
    Text(String),
    /// Input is a contract call; holds the method label.
    Contract(String),
    /// Unrecognised short payload, truncated.
    Hex(String),
}

impl ParsedInput {
    pub fn is_contract_call(&self) -> bool {
        matches!(self, ParsedInput::Contract(_))
    }
}

fn is_readable(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| (' '..='~').contains(&c) || ('\u{4e00}'..='\u{9fa5}').contains(&c))
}

/// Classify transaction input.
///
/// `to` is the transaction recipient; when it equals `our_contract` the
/// contract's own selectors are named.
pub fn parse_input_data(input: &[u8], to: Option<Address>, our_contract: Option<Address>) -> ParsedInput {
    if input.is_empty() {
        return ParsedInput::Empty;
    }

    if let Ok(text) = std::str::from_utf8(input) {
        if is_readable(text) {
            return ParsedInput::Text(text.to_string());
        }
    }

    if input.len() >= 4 {
        let selector: [u8; 4] = [input[0], input[1], input[2], input[3]];
        if to.is_some() && to == our_contract {
            if selector == IDataLogger::logDataCall::SELECTOR {
                return ParsedInput::Contract("logData (event log upload)".to_string());
            }
            if selector == IDataLogger::logWithPaymentCall::SELECTOR {
                return ParsedInput::Contract("logWithPayment (contract payment)".to_string());
            }
        }
        if let Some((_, name)) = KNOWN_SELECTORS.iter().find(|(s, _)| *s == selector) {
            return ParsedInput::Contract((*name).to_string());
        }
        return ParsedInput::Contract(format!("contract call: 0x{}...", hex::encode(selector)));
    }

    let hex = format!("0x{}", hex::encode(input));
    if hex.len() > 66 {
        ParsedInput::Hex(format!("{}...", &hex[..66]))
    } else {
        ParsedInput::Hex(hex)
    }
}

/// UTF-8 text as transaction input.
pub fn text_to_hex(text: &str) -> Bytes {
    Bytes::copy_from_slice(text.as_bytes())
}

/// Accept hex with or without `0x`; rejects odd length or non-hex digits.
pub fn normalize_hex(input: &str) -> Result<Bytes, hex::FromHexError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_event_signatures_match_solidity() {
        assert_eq!(
            IDataLogger::DataStored::SIGNATURE,
            "DataStored(uint256,address,string,string,uint256)"
        );
        assert_eq!(
            IDataLogger::TransactionLogged::SIGNATURE,
            "TransactionLogged(uint256,address,address,uint256,string,uint256)"
        );
        assert_eq!(
            IDataLogger::DataStored::SIGNATURE_HASH,
            keccak256("DataStored(uint256,address,string,string,uint256)")
        );
    }

    #[test]
    fn test_plain_text_input() {
        let parsed = parse_input_data(b"hello world", None, None);
        assert_eq!(parsed, ParsedInput::Text("hello world".into()));
    }

    #[test]
    fn test_cjk_text_input() {
        let parsed = parse_input_data("转账备注".as_bytes(), None, None);
        assert_eq!(parsed, ParsedInput::Text("转账备注".into()));
    }

    #[test]
    fn test_our_selector_named_only_for_our_contract() {
        let ours = Address::repeat_byte(0x42);
        let call = IDataLogger::logDataCall {
            category: "c".into(),
            data: "d".into(),
        }
        .abi_encode();

        let parsed = parse_input_data(&call, Some(ours), Some(ours));
        assert!(matches!(parsed, ParsedInput::Contract(ref s) if s.starts_with("logData")));

        let elsewhere = parse_input_data(&call, Some(Address::repeat_byte(1)), Some(ours));
        assert!(matches!(elsewhere, ParsedInput::Contract(ref s) if s.starts_with("contract call: 0x")));
    }

    #[test]
    fn test_erc20_selector() {
        let mut input = vec![0xa9, 0x05, 0x9c, 0xbb];
        input.extend_from_slice(&[0u8; 64]);
        assert_eq!(
            parse_input_data(&input, Some(Address::repeat_byte(1)), None),
            ParsedInput::Contract("transfer(address,uint256)".into())
        );
    }

    #[test]
    fn test_short_binary_is_hex() {
        assert_eq!(
            parse_input_data(&[0x00, 0xff], None, None),
            ParsedInput::Hex("0x00ff".into())
        );
        assert_eq!(parse_input_data(&[], None, None), ParsedInput::Empty);
    }

    #[test]
    fn test_normalize_hex() {
        assert_eq!(normalize_hex("0xdeadbeef").unwrap().as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(normalize_hex("DEADBEEF").unwrap().len(), 4);
        assert!(normalize_hex("0xabc").is_err());
        assert!(normalize_hex("zz").is_err());
    }

    #[test]
    fn test_record_counts_return_decodes() {
        use alloy_sol_types::SolValue;
        let encoded = (U256::from(3u64), U256::from(1u64)).abi_encode_params();
        let counts = IDataLogger::getRecordCountsCall::abi_decode_returns(&encoded, true).unwrap();
        assert_eq!(counts.dataCount, U256::from(3u64));
        assert_eq!(counts.txCount, U256::from(1u64));
    }
}
