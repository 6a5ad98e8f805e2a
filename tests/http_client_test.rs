use std::str::FromStr;

use express_relay_client::types::{
    BidCreate, BidEvm, BidStatus, OpportunityDelete, OpportunityParams, QuoteRequest,
    SpecifiedTokenAmount,
};
use express_relay_client::{Address, Bytes, ClientConfig, ClientError, HttpClient, Pubkey, U256};
use mockito::Matcher;
use serde_json::json;
use uuid::Uuid;

const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

fn client(server: &mockito::ServerGuard) -> HttpClient {
    HttpClient::new(&ClientConfig::new(server.url()).with_api_key("secret")).unwrap()
}

fn evm_bid() -> BidCreate {
    BidCreate::Evm(BidEvm {
        chain_id: "op_sepolia".to_string(),
        amount: U256::from(100u64),
        permission_key: Bytes::from(vec![1u8; 32]),
        target_contract: Address::from_low_u64_be(0x1234),
        target_calldata: Bytes::from(vec![0xde, 0xad]),
    })
}

#[tokio::test]
async fn test_indicative_quote() {
    let mut server = mockito::Server::new_async().await;
    let reference_id = Uuid::new_v4();
    let mock = server
        .mock("POST", "/v1/opportunities/quote")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::PartialJson(json!({
            "chain_id": "solana",
            "input_token_mint": SOL_MINT,
            "output_token_mint": USDC_MINT,
            "specified_token_amount": { "side": "input", "amount": 10000 },
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "chain_id": "solana",
                "expiration_time": 1_700_000_030i64,
                "input_token": { "token": SOL_MINT, "amount": 10000 },
                "output_token": { "token": USDC_MINT, "amount": 1534 },
                "reference_id": reference_id,
            })
            .to_string(),
        )
        .create_async()
        .await;

    let request = QuoteRequest {
        chain_id: "solana".to_string(),
        input_token_mint: Pubkey::from_str(SOL_MINT).unwrap(),
        output_token_mint: Pubkey::from_str(USDC_MINT).unwrap(),
        specified_token_amount: SpecifiedTokenAmount::Input(10_000),
        referral_fee_info: None,
        user_wallet_address: None,
        memo: None,
        minimum_lifetime: None,
    };
    let quote = client(&server).get_quote(&request).await.unwrap();

    mock.assert_async().await;
    assert!(quote.is_indicative());
    assert!(quote.transaction.is_none());
    assert_eq!(quote.input_token.amount, 10_000);
    assert_eq!(quote.input_token.token, request.input_token_mint);
    assert_eq!(quote.output_token.amount, 1_534);
    assert_eq!(quote.reference_id, reference_id);
}

#[tokio::test]
async fn test_no_live_opportunities_is_empty_list() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/opportunities")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("chain_id".into(), "solana".into()),
            Matcher::UrlEncoded("limit".into(), "100".into()),
        ]))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let params = OpportunityParams {
        limit: Some(500),
        ..OpportunityParams::for_chain("solana")
    };
    let opportunities = client(&server).get_opportunities(&params).await.unwrap();

    mock.assert_async().await;
    assert!(opportunities.is_empty());
}

#[tokio::test]
async fn test_opportunity_listing_skips_unsupported_items() {
    let mut server = mockito::Server::new_async().await;
    let body = json!([
        {
            "version": "v1",
            "chain_id": "op_sepolia",
            "opportunity_id": Uuid::new_v4(),
            "creation_time": 1_700_000_000_000_000i64,
            "permission_key": "0x0102",
            "target_contract": "0x63aa8ee2c3e1e2f9b3f04e1cbbe8aa4d33cb7d5f",
            "target_calldata": "0x",
            "target_call_value": "0",
            "sell_tokens": [],
            "buy_tokens": [],
        },
        { "version": "v2", "chain_id": "op_sepolia" },
        {
            "version": "v1",
            "chain_id": "op_sepolia",
            "opportunity_id": Uuid::new_v4(),
            "creation_time": 0,
            "permission_key": "0x01",
            "target_contract": "not-an-address",
            "target_calldata": "0x",
            "target_call_value": "0",
            "sell_tokens": [],
            "buy_tokens": [],
        },
    ]);
    server
        .mock("GET", "/v1/opportunities")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let opportunities = client(&server)
        .get_opportunities(&OpportunityParams::default())
        .await
        .unwrap();
    assert_eq!(opportunities.len(), 1);
    assert_eq!(opportunities[0].chain_id(), "op_sepolia");
}

#[tokio::test]
async fn test_http_error_carries_status_and_body() {
    let mut server = mockito::Server::new_async().await;
    let bid_id = Uuid::new_v4();
    server
        .mock("GET", format!("/v1/bids/{bid_id}").as_str())
        .with_status(404)
        .with_body(r#"{"error":"Bid not found"}"#)
        .create_async()
        .await;

    match client(&server).get_bid_status(bid_id).await {
        Err(ClientError::Http { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, r#"{"error":"Bid not found"}"#);
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_success_body_is_no_data() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/bids")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    assert!(matches!(
        client(&server).submit_bid(&evm_bid()).await,
        Err(ClientError::NoData(_))
    ));
}

#[tokio::test]
async fn test_submit_bid_returns_id() {
    let mut server = mockito::Server::new_async().await;
    let bid_id = Uuid::new_v4();
    let mock = server
        .mock("POST", "/v1/bids")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::PartialJson(json!({ "chain_id": "op_sepolia" })))
        .with_status(200)
        .with_body(json!({ "id": bid_id, "status": "OK" }).to_string())
        .create_async()
        .await;

    assert_eq!(client(&server).submit_bid(&evm_bid()).await.unwrap(), bid_id);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_bid_is_not_sent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/v1/bids").expect(0).create_async().await;

    let bid = match evm_bid() {
        BidCreate::Evm(bid) => BidCreate::Evm(BidEvm {
            permission_key: Bytes::default(),
            ..bid
        }),
        other => other,
    };
    assert!(matches!(
        client(&server).submit_bid(&bid).await,
        Err(ClientError::Validation { .. })
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_bid_status_and_history() {
    let mut server = mockito::Server::new_async().await;
    let bid_id = Uuid::new_v4();
    server
        .mock("GET", format!("/v1/bids/{bid_id}").as_str())
        .with_status(200)
        .with_body(
            json!({
                "id": bid_id,
                "chain_id": "op_sepolia",
                "status": { "type": "won", "result": "0xabc", "index": 1 },
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/v1/bids")
        .match_query(Matcher::Regex("from_time=2024".to_string()))
        .with_status(200)
        .with_body(
            json!({
                "items": [{
                    "id": bid_id,
                    "chain_id": "solana",
                    "bid_amount": 5000,
                    "status": { "type": "pending" },
                    "initiation_time": "2024-05-01T12:00:00Z",
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client(&server);
    assert_eq!(
        client.get_bid_status(bid_id).await.unwrap(),
        BidStatus::Won {
            result: "0xabc".to_string(),
            index: Some(1)
        }
    );

    let from_time = chrono::DateTime::parse_from_rfc3339("2024-04-30T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let bids = client.get_bids(Some(from_time)).await.unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].status, BidStatus::Pending);
}

#[tokio::test]
async fn test_remove_opportunities_accepts_no_content() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/v1/opportunities")
        .match_body(Matcher::PartialJson(json!({
            "chain_type": "evm",
            "chain_id": "op_sepolia",
        })))
        .with_status(204)
        .create_async()
        .await;

    let delete = OpportunityDelete::Evm {
        chain_id: "op_sepolia".to_string(),
        permission_key: Bytes::from(vec![0xab; 4]),
    };
    client(&server).remove_opportunities(&delete).await.unwrap();
    mock.assert_async().await;
}
