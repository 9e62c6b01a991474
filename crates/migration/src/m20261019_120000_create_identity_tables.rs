//! Creates the identity tables:
//! - client: registered applications
//! - user: authenticating principals
//! - session: grant, access, refresh and action tokens

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Client::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Client::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Client::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Client::Description).text().not_null())
                    .col(ColumnDef::new(Client::Key).string().not_null().unique_key())
                    .col(ColumnDef::new(Client::Secret).string().not_null())
                    .col(ColumnDef::new(Client::Scopes).text().not_null())
                    .col(ColumnDef::new(Client::CanonicalUri).text().not_null())
                    .col(ColumnDef::new(Client::RedirectUri).text().not_null())
                    .col(
                        ColumnDef::new(Client::ClientType)
                            .text()
                            .not_null()
                            .default("confidential"),
                    )
                    .col(
                        ColumnDef::new(Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Client::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(User::PublicId).string().not_null().unique_key())
                    .col(ColumnDef::new(User::Username).string().not_null().unique_key())
                    .col(ColumnDef::new(User::FirstName).string().not_null())
                    .col(ColumnDef::new(User::LastName).string().not_null())
                    .col(ColumnDef::new(User::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(User::Passphrase).string().not_null())
                    .col(
                        ColumnDef::new(User::Active)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(User::Admin)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(User::ClientId).string().not_null())
                    .col(
                        ColumnDef::new(User::Language)
                            .string()
                            .not_null()
                            .default("en-US"),
                    )
                    .col(
                        ColumnDef::new(User::TimezoneIdentifier)
                            .string()
                            .not_null()
                            .default("GMT"),
                    )
                    .col(ColumnDef::new(User::CodeSecret).text().not_null())
                    .col(ColumnDef::new(User::RecoverSecret).string().not_null())
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(User::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_client")
                            .from(User::Table, User::ClientId)
                            .to(Client::Table, Client::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Session::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Session::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Session::Token).string().not_null().unique_key())
                    .col(ColumnDef::new(Session::TokenType).text().not_null())
                    .col(ColumnDef::new(Session::UserId).string().not_null())
                    .col(ColumnDef::new(Session::ClientId).string().not_null())
                    .col(
                        ColumnDef::new(Session::Scopes)
                            .text()
                            .not_null()
                            .default("public"),
                    )
                    .col(ColumnDef::new(Session::Moment).big_integer().not_null())
                    .col(ColumnDef::new(Session::ExpiresIn).big_integer().not_null())
                    .col(ColumnDef::new(Session::Ip).string().not_null())
                    .col(ColumnDef::new(Session::UserAgent).text().not_null())
                    .col(
                        ColumnDef::new(Session::Invalidated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_session_user")
                            .from(Session::Table, Session::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_session_client")
                            .from(Session::Table, Session::ClientId)
                            .to(Client::Table, Client::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Active-session lookups filter on client and user.
        manager
            .create_index(
                Index::create()
                    .name("idx_session_client_user")
                    .table(Session::Table)
                    .col(Session::ClientId)
                    .col(Session::UserId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_session_token_type")
                    .table(Session::Table)
                    .col(Session::TokenType)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Session::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Client::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Client {
    Table,
    Id,
    Name,
    Description,
    Key,
    Secret,
    Scopes,
    CanonicalUri,
    RedirectUri,
    ClientType,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
    PublicId,
    Username,
    FirstName,
    LastName,
    Email,
    Passphrase,
    Active,
    Admin,
    ClientId,
    Language,
    TimezoneIdentifier,
    CodeSecret,
    RecoverSecret,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Session {
    Table,
    Id,
    Token,
    TokenType,
    UserId,
    ClientId,
    Scopes,
    Moment,
    ExpiresIn,
    Ip,
    UserAgent,
    Invalidated,
}
