use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_checkout_tables::Migration),
            Box::new(m20240101_000003_create_order_tables::Migration),
            Box::new(m20240101_000004_create_payment_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductVariants::Sku).string().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::Name).string().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::Price)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::QuantityUnit)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::ImageUrl).string().null())
                        .col(
                            ColumnDef::new(ProductVariants::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CustomerAddresses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomerAddresses::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomerAddresses::UserId).big_integer().null())
                        .col(ColumnDef::new(CustomerAddresses::GuestId).uuid().null())
                        .col(
                            ColumnDef::new(CustomerAddresses::Recipient)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomerAddresses::Phone).string().not_null())
                        .col(ColumnDef::new(CustomerAddresses::Street).string().not_null())
                        .col(ColumnDef::new(CustomerAddresses::City).string().not_null())
                        .col(
                            ColumnDef::new(CustomerAddresses::Province)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerAddresses::PostalCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerAddresses::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomerAddresses::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CustomerAddresses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum ProductVariants {
        Table,
        Id,
        ProductId,
        Sku,
        ProductName,
        Name,
        Price,
        Stock,
        QuantityUnit,
        ImageUrl,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum CustomerAddresses {
        Table,
        Id,
        UserId,
        GuestId,
        Recipient,
        Phone,
        Street,
        City,
        Province,
        PostalCode,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_checkout_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_checkout_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CheckoutSessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CheckoutSessions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::ExternalId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CheckoutSessions::UserId).big_integer().null())
                        .col(ColumnDef::new(CheckoutSessions::GuestId).uuid().null())
                        .col(ColumnDef::new(CheckoutSessions::Status).string().not_null())
                        .col(
                            ColumnDef::new(CheckoutSessions::Subtotal)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CheckoutSessions::Tax).big_integer().not_null())
                        .col(
                            ColumnDef::new(CheckoutSessions::ShippingFee)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::Discount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::Total)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CheckoutSessions::Currency).string().not_null())
                        .col(
                            ColumnDef::new(CheckoutSessions::AddressId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::PaymentMethod)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::ExpiresAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::ConfirmedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessions::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_checkout_sessions_status")
                        .table(CheckoutSessions::Table)
                        .col(CheckoutSessions::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CheckoutSessionItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CheckoutSessionItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::SessionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::VariantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::VariantName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::QuantityUnit)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::UnitPrice)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::Subtotal)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutSessionItems::ImageUrl)
                                .string()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_checkout_session_items_session_id")
                        .table(CheckoutSessionItems::Table)
                        .col(CheckoutSessionItems::SessionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CheckoutSessionItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CheckoutSessions::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum CheckoutSessions {
        Table,
        Id,
        ExternalId,
        UserId,
        GuestId,
        Status,
        Subtotal,
        Tax,
        ShippingFee,
        Discount,
        Total,
        Currency,
        AddressId,
        PaymentMethod,
        ExpiresAt,
        ConfirmedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum CheckoutSessionItems {
        Table,
        Id,
        SessionId,
        VariantId,
        ProductName,
        VariantName,
        Quantity,
        QuantityUnit,
        UnitPrice,
        Subtotal,
        ImageUrl,
    }
}

mod m20240101_000003_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::ExternalId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::UserId).big_integer().null())
                        .col(ColumnDef::new(Orders::GuestId).uuid().null())
                        // Idempotency key: at most one order per checkout session.
                        .col(
                            ColumnDef::new(Orders::CheckoutSessionId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::Subtotal).big_integer().not_null())
                        .col(ColumnDef::new(Orders::Tax).big_integer().not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingFee)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Discount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Total).big_integer().not_null())
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::AddressId).big_integer().not_null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderItems::VariantName).string().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::QuantityUnit).string().not_null())
                        .col(ColumnDef::new(OrderItems::UnitPrice).big_integer().not_null())
                        .col(ColumnDef::new(OrderItems::Subtotal).big_integer().not_null())
                        .col(ColumnDef::new(OrderItems::ImageUrl).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        ExternalId,
        UserId,
        GuestId,
        CheckoutSessionId,
        Status,
        Subtotal,
        Tax,
        ShippingFee,
        Discount,
        Total,
        Currency,
        AddressId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        VariantId,
        ProductName,
        VariantName,
        Quantity,
        QuantityUnit,
        UnitPrice,
        Subtotal,
        ImageUrl,
    }
}

mod m20240101_000004_create_payment_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_payment_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Payments::ExternalId).string().not_null())
                        .col(ColumnDef::new(Payments::ProviderPaymentId).string().null())
                        .col(ColumnDef::new(Payments::Amount).big_integer().not_null())
                        .col(ColumnDef::new(Payments::Currency).string().not_null())
                        .col(ColumnDef::new(Payments::Status).string().not_null())
                        .col(ColumnDef::new(Payments::Channel).string().null())
                        .col(ColumnDef::new(Payments::PaymentCode).string().null())
                        .col(ColumnDef::new(Payments::ExpiresAt).timestamp().null())
                        .col(ColumnDef::new(Payments::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Payments::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_order_id")
                        .table(Payments::Table)
                        .col(Payments::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_provider_payment_id")
                        .table(Payments::Table)
                        .col(Payments::ProviderPaymentId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaymentWebhookEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::Provider)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::ProviderEventId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::EventType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::ReferenceId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::Payload)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::SignatureValid)
                                .boolean()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::ProcessedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::FailureReason)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentWebhookEvents::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Duplicate deliveries race safely against this constraint.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_payment_webhook_events_provider_event")
                        .table(PaymentWebhookEvents::Table)
                        .col(PaymentWebhookEvents::Provider)
                        .col(PaymentWebhookEvents::ProviderEventId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentWebhookEvents::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Payments {
        Table,
        Id,
        OrderId,
        ExternalId,
        ProviderPaymentId,
        Amount,
        Currency,
        Status,
        Channel,
        PaymentCode,
        ExpiresAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum PaymentWebhookEvents {
        Table,
        Id,
        Provider,
        ProviderEventId,
        EventType,
        ReferenceId,
        Payload,
        SignatureValid,
        ProcessedAt,
        FailureReason,
        CreatedAt,
    }
}
