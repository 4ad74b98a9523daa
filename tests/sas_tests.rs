use blobtour::auth::{
    generate_account_sas, sign_account_sas, AccountSasPermissions, AccountSasPolicy,
    AccountSasResourceTypes, AccountSasServices, SasOperation, SasPermission, SasProtocol,
    SasResourceType, SasService, SasToken, StorageAccount, DEV_STORE_ACCOUNT_KEY,
    DEV_STORE_ACCOUNT_NAME,
};
use blobtour::error::BlobTourError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::net::{IpAddr, Ipv4Addr};

fn expiry() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

fn demo_policy() -> AccountSasPolicy {
    AccountSasPolicy {
        permissions: [
            SasPermission::Read,
            SasPermission::Write,
            SasPermission::Delete,
            SasPermission::List,
            SasPermission::Create,
        ]
        .into_iter()
        .collect(),
        services: AccountSasServices::empty().with(SasService::Blob),
        resource_types: AccountSasResourceTypes::empty()
            .with(SasResourceType::Container)
            .with(SasResourceType::Object),
        start: None,
        expiry: expiry(),
        protocol: Some(SasProtocol::HttpsOrHttp),
        ip: None,
    }
}

fn sign(policy: &AccountSasPolicy) -> SasToken {
    sign_account_sas(DEV_STORE_ACCOUNT_NAME, DEV_STORE_ACCOUNT_KEY, policy).unwrap()
}

#[cfg(test)]
mod signing_tests {
    use super::*;

    #[test]
    fn test_known_signature() {
        let token = sign(&demo_policy());

        assert_eq!(token.signature(), "vkPJNPrn73wu+c9N6yQRYjaFp1CSrmOZDcYzACdDozA=");
        assert_eq!(
            token.to_string(),
            "sv=2019-02-02&ss=b&srt=co&sp=rwdlc&se=2030-01-01T00%3A00%3A00Z&spr=https%2Chttp&sig=vkPJNPrn73wu%2Bc9N6yQRYjaFp1CSrmOZDcYzACdDozA%3D"
        );
    }

    #[test]
    fn test_parse_rendered_token() {
        let token = sign(&demo_policy());
        let parsed = SasToken::parse(&format!("?{token}")).unwrap();

        assert_eq!(parsed, token);
        assert_eq!(parsed.expiry(), expiry());
        assert_eq!(parsed.protocol(), Some(SasProtocol::HttpsOrHttp));
    }

    #[test]
    fn test_generate_requires_account_key() {
        let account = StorageAccount::development();
        let token = generate_account_sas(&account, &demo_policy()).unwrap();

        let sas_account = account.with_sas(token);
        let err = generate_account_sas(&sas_account, &demo_policy()).unwrap_err();
        assert!(matches!(err, BlobTourError::ConfigError(_)));
    }

    #[test]
    fn test_empty_policy_rejected() {
        let policy = AccountSasPolicy {
            permissions: AccountSasPermissions::empty(),
            ..demo_policy()
        };
        let err = sign_account_sas(DEV_STORE_ACCOUNT_NAME, DEV_STORE_ACCOUNT_KEY, &policy)
            .unwrap_err();
        assert!(matches!(err, BlobTourError::SasError(_)));
    }

    #[test]
    fn test_start_after_expiry_rejected() {
        let policy = AccountSasPolicy {
            start: Some(expiry() + Duration::hours(1)),
            ..demo_policy()
        };
        assert!(sign_account_sas(DEV_STORE_ACCOUNT_NAME, DEV_STORE_ACCOUNT_KEY, &policy).is_err());
    }
}

#[cfg(test)]
mod authorization_tests {
    use super::*;

    fn authorize(token: &SasToken, now: DateTime<Utc>, operation: SasOperation) -> Result<(), BlobTourError> {
        token.authorize(DEV_STORE_ACCOUNT_NAME, DEV_STORE_ACCOUNT_KEY, now, operation)
    }

    #[test]
    fn test_accepted_before_expiry_rejected_at_and_after() {
        let token = sign(&demo_policy());

        assert!(authorize(&token, expiry() - Duration::seconds(1), SasOperation::ReadBlob).is_ok());
        assert!(matches!(
            authorize(&token, expiry(), SasOperation::ReadBlob),
            Err(BlobTourError::AuthorizationFailed(_))
        ));
        assert!(authorize(&token, expiry() + Duration::hours(1), SasOperation::ReadBlob).is_err());
    }

    #[test]
    fn test_not_valid_before_start() {
        let start = expiry() - Duration::days(1);
        let token = sign(&AccountSasPolicy {
            start: Some(start),
            ..demo_policy()
        });

        assert!(authorize(&token, start - Duration::seconds(1), SasOperation::ListBlobs).is_err());
        assert!(authorize(&token, start, SasOperation::ListBlobs).is_ok());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let token = sign(&demo_policy());
        let tampered = token
            .to_string()
            .replace("sp=rwdlc", "sp=rwdlac");
        let tampered = SasToken::parse(&tampered).unwrap();

        let now = expiry() - Duration::days(1);
        assert!(authorize(&token, now, SasOperation::WriteBlob).is_ok());
        assert!(matches!(
            authorize(&tampered, now, SasOperation::WriteBlob),
            Err(BlobTourError::AuthorizationFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = sign(&demo_policy());
        let now = expiry() - Duration::days(1);
        let result = token.authorize(
            DEV_STORE_ACCOUNT_NAME,
            "c29tZSBvdGhlciBrZXk=",
            now,
            SasOperation::ReadBlob,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_permission_rejected() {
        let read_only = sign(&AccountSasPolicy {
            permissions: AccountSasPermissions::empty()
                .with(SasPermission::Read)
                .with(SasPermission::List),
            ..demo_policy()
        });
        let now = expiry() - Duration::days(1);

        assert!(authorize(&read_only, now, SasOperation::ReadBlob).is_ok());
        assert!(authorize(&read_only, now, SasOperation::ListBlobs).is_ok());
        assert!(authorize(&read_only, now, SasOperation::WriteBlob).is_err());
        assert!(authorize(&read_only, now, SasOperation::DeleteBlob).is_err());
        assert!(authorize(&read_only, now, SasOperation::CreateContainer).is_err());
    }

    #[test]
    fn test_missing_resource_type_rejected() {
        let objects_only = sign(&AccountSasPolicy {
            resource_types: AccountSasResourceTypes::empty().with(SasResourceType::Object),
            ..demo_policy()
        });
        let now = expiry() - Duration::days(1);

        assert!(authorize(&objects_only, now, SasOperation::ReadBlob).is_ok());
        assert!(authorize(&objects_only, now, SasOperation::CreateContainer).is_err());
        assert!(authorize(&objects_only, now, SasOperation::ListBlobs).is_err());
    }

    #[test]
    fn test_other_service_rejected() {
        let queue_only = sign(&AccountSasPolicy {
            services: AccountSasServices::empty().with(SasService::Queue),
            ..demo_policy()
        });
        let now = expiry() - Duration::days(1);
        assert!(authorize(&queue_only, now, SasOperation::ReadBlob).is_err());
    }

    #[test]
    fn test_https_only_token_refuses_http() {
        let https_only = sign(&AccountSasPolicy {
            protocol: Some(SasProtocol::HttpsOnly),
            ..demo_policy()
        });
        assert!(https_only.allows_protocol("https"));
        assert!(!https_only.allows_protocol("http"));

        let either = sign(&demo_policy());
        assert!(either.allows_protocol("http"));

        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(either.check_origin("http", loopback).is_ok());
        assert!(matches!(
            https_only.check_origin("http", loopback),
            Err(BlobTourError::AuthorizationFailed(_))
        ));
    }

    #[test]
    fn test_signed_ip_range() {
        let ranged = sign(&AccountSasPolicy {
            ip: Some("10.0.0.1-10.0.0.20".to_string()),
            ..demo_policy()
        });
        assert!(ranged.allows_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(ranged.allows_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 20))));
        assert!(!ranged.allows_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 21))));
        assert!(ranged
            .check_origin("https", IpAddr::V4(Ipv4Addr::LOCALHOST))
            .is_err());

        let single = sign(&AccountSasPolicy {
            ip: Some("127.0.0.1".to_string()),
            ..demo_policy()
        });
        assert!(single.allows_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(!single.allows_ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2))));

        assert!(sign(&demo_policy()).allows_ip(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }
}
