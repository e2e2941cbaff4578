// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_graphql_parser::types::{DocumentOperations, ExecutableDocument};
use async_graphql_value::Name;
use core_model::Schema;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::validation::validation_error::ValidationError;

use super::{operation::ValidatedOperation, operation_validator::OperationValidator};

/// Context for validating a document.
pub struct DocumentValidator<'a> {
    schema: &'a Schema,
    operation_name: Option<String>,
    variables: Option<Map<String, Value>>,
    max_depth: usize,
}

impl<'a> DocumentValidator<'a> {
    pub fn new(
        schema: &'a Schema,
        operation_name: Option<String>,
        variables: Option<Map<String, Value>>,
        max_depth: usize,
    ) -> Self {
        Self {
            schema,
            operation_name,
            variables,
            max_depth,
        }
    }

    /// Validate the query payload.
    ///
    /// Validations performed:
    /// - Validate that either there is only one operation or the operation name specified matches
    ///   one of the operations in the document
    /// - Validate that there is at least one operation
    /// - Other validations are delegated to the operation validator
    #[instrument(
        name = "DocumentValidator::validate"
        skip(self, document)
        )]
    pub fn validate(
        self,
        document: ExecutableDocument,
    ) -> Result<ValidatedOperation, ValidationError> {
        let (operation_name, raw_operation) = match document.operations {
            DocumentOperations::Single(operation) => (self.operation_name, operation),
            DocumentOperations::Multiple(mut operations) => match self.operation_name {
                // async-graphql parses a single named operation (`query Foo { ... }`) to
                // `DocumentOperations::Multiple`, so the operation name is only required when
                // there is truly more than one operation.
                None if operations.len() <= 1 => {
                    let (operation_name, operation) = operations
                        .into_iter()
                        .next()
                        .ok_or(ValidationError::NoOperationFound)?;
                    (Some(operation_name.to_string()), operation)
                }
                None => return Err(ValidationError::MultipleOperationsNoOperationName),
                Some(operation_name) => match operations.remove(&Name::new(&operation_name)) {
                    None => {
                        return Err(ValidationError::MultipleOperationsUnmatchedOperationName(
                            operation_name,
                        ));
                    }
                    Some(operation) => (Some(operation_name), operation),
                },
            },
        };

        let operation_validator = OperationValidator::new(
            self.schema,
            operation_name,
            self.variables,
            document.fragments,
            self.max_depth,
        );

        operation_validator.validate(raw_operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_graphql_parser::{parse_query, types::OperationType};
    use core_model::{ArgumentDefinition, FieldDefinition, FieldType, SchemaBuilder};
    use serde_json::json;

    use crate::validation::field::ValidatedField;

    fn blog_schema() -> Schema {
        SchemaBuilder::new()
            .object(
                "Query",
                [
                    FieldDefinition::new("post", FieldType::named("Post")).argument(
                        ArgumentDefinition::new("id", FieldType::named("Int").non_null()),
                    ),
                    FieldDefinition::new(
                        "posts",
                        FieldType::named("Post").non_null().list().non_null(),
                    )
                    .argument(
                        ArgumentDefinition::new("first", FieldType::named("Int"))
                            .default_value(json!(10)),
                    )
                    .argument(ArgumentDefinition::new("status", FieldType::named("Status"))),
                    FieldDefinition::new("user", FieldType::named("User")).argument(
                        ArgumentDefinition::new("id", FieldType::named("Int").non_null()),
                    ),
                ],
            )
            .object(
                "Post",
                [
                    FieldDefinition::new("id", FieldType::named("Int").non_null()),
                    FieldDefinition::new("title", FieldType::named("String")),
                    FieldDefinition::new("author", FieldType::named("User")),
                ],
            )
            .object(
                "User",
                [
                    FieldDefinition::new("id", FieldType::named("Int").non_null()),
                    FieldDefinition::new("name", FieldType::named("String")),
                    FieldDefinition::new("verified", FieldType::named("Boolean")),
                    FieldDefinition::new("posts", FieldType::named("Post").list()),
                ],
            )
            .object(
                "Message",
                [
                    FieldDefinition::new("chatId", FieldType::named("ID").non_null()),
                    FieldDefinition::new("text", FieldType::named("String")),
                ],
            )
            .enumeration("Status", ["DRAFT", "PUBLISHED"])
            .object(
                "Subscription",
                [
                    FieldDefinition::new("messageAdded", FieldType::named("Message")).argument(
                        ArgumentDefinition::new("chatId", FieldType::named("ID").non_null()),
                    ),
                    FieldDefinition::new("postAdded", FieldType::named("Post")),
                ],
            )
            .build()
            .unwrap()
    }

    fn validate(
        query: &str,
        operation_name: Option<&str>,
        variables: Option<Value>,
        max_depth: usize,
    ) -> Result<ValidatedOperation, ValidationError> {
        let schema = blog_schema();
        let variables = variables.map(|v| v.as_object().unwrap().clone());

        DocumentValidator::new(
            &schema,
            operation_name.map(str::to_string),
            variables,
            max_depth,
        )
        .validate(parse_query(query).unwrap())
    }

    fn output_names(fields: &[ValidatedField]) -> Vec<String> {
        fields.iter().map(ValidatedField::output_name).collect()
    }

    #[test]
    fn nested_selection_with_arguments() {
        let operation = validate(
            r#"
            query {
                post(id: 1) {
                    id
                    title
                    author {
                        id
                        name
                    }
                }
            }
        "#,
            None,
            None,
            10,
        )
        .unwrap();

        assert_eq!(operation.typ, OperationType::Query);
        let post = &operation.fields[0];
        assert_eq!(post.arguments["id"], json!(1));
        assert_eq!(output_names(&post.subfields), vec!["id", "title", "author"]);
        assert_eq!(operation.depth(), 3);
    }

    #[test]
    fn stray_and_missing_arguments() {
        let stray = validate(r#"{ post(id: 1, draft: true) { id } }"#, None, None, 10);
        assert!(matches!(
            stray,
            Err(ValidationError::StrayArguments(ref names, ref field, _))
                if names == &["draft"] && field == "post"
        ));

        let missing = validate(r#"{ post { id } }"#, None, None, 10);
        assert!(matches!(
            missing,
            Err(ValidationError::RequiredArgumentNotFound(ref name, _)) if name == "id"
        ));
    }

    #[test]
    fn omitted_argument_with_default_is_left_to_the_engine() {
        let operation = validate(r#"{ posts { id } }"#, None, None, 10).unwrap();

        assert!(operation.fields[0].arguments.is_empty());
    }

    #[test]
    fn argument_types_are_checked() {
        let wrong_scalar = validate(r#"{ post(id: "one") { id } }"#, None, None, 10);
        assert!(matches!(
            wrong_scalar,
            Err(ValidationError::InvalidArgumentType { ref expected_type, ref actual_type, .. })
                if expected_type == "Int!" && actual_type == "String"
        ));

        let wrong_enum = validate(r#"{ posts(status: ARCHIVED) { id } }"#, None, None, 10);
        assert!(matches!(
            wrong_enum,
            Err(ValidationError::InvalidArgumentType { .. })
        ));

        let operation = validate(r#"{ posts(status: DRAFT) { id } }"#, None, None, 10).unwrap();
        assert_eq!(operation.fields[0].arguments["status"], json!("DRAFT"));
    }

    #[test]
    fn variables_and_their_defaults_are_substituted() {
        let query = r#"
            query($postId: Int!, $userId: Int!, $first: Int = 5) {
                post(id: $postId) {
                    id
                }
                user(id: $userId) {
                    name
                }
                posts(first: $first) {
                    id
                }
            }
        "#;

        let operation =
            validate(query, None, Some(json!({"postId": 1, "userId": 2})), 10).unwrap();
        assert_eq!(operation.fields[0].arguments["id"], json!(1));
        assert_eq!(operation.fields[1].arguments["id"], json!(2));
        assert_eq!(operation.fields[2].arguments["first"], json!(5));

        let missing = validate(query, None, Some(json!({"postId": 2})), 10);
        assert!(matches!(
            missing,
            Err(ValidationError::VariableNotFound(ref name, _)) if name == "userId"
        ));
    }

    #[test]
    fn malformed_selections() {
        let unknown = validate(r#"{ post(id: 1) { id rating } }"#, None, None, 10);
        assert!(matches!(
            unknown,
            Err(ValidationError::InvalidField(ref field, ref typ, _))
                if field == "rating" && typ == "Post"
        ));

        let scalar_with_fields = validate(r#"{ post(id: 1) { title { id } } }"#, None, None, 10);
        assert!(matches!(
            scalar_with_fields,
            Err(ValidationError::ScalarWithField(..))
        ));

        let missing_selection = validate(r#"{ post(id: 1) }"#, None, None, 10);
        assert!(matches!(
            missing_selection,
            Err(ValidationError::MissingSubfields(..))
        ));
    }

    #[test]
    fn fragments_are_inlined_and_fields_merged() {
        let operation = validate(
            r#"
            query {
               posts {
                    id
                    ...postFields
                    ... on Post {
                        author { verified }
                    }
                    headline: title
                    __typename
                }
            }

            fragment postFields on Post {
                title
                author { id name }
            }
        "#,
            None,
            None,
            10,
        )
        .unwrap();

        let posts = &operation.fields[0];
        assert_eq!(
            output_names(&posts.subfields),
            vec!["id", "title", "author", "headline", "__typename"]
        );
        assert_eq!(
            output_names(&posts.subfields[2].subfields),
            vec!["id", "name", "verified"]
        );
    }

    #[test]
    fn conflicting_aliases() {
        let result = validate(r#"{ posts { label: title label: id } }"#, None, None, 10);

        assert!(matches!(
            result,
            Err(ValidationError::ConflictingFields(ref name, _)) if name == "label"
        ));
    }

    #[test]
    fn skip_and_include() {
        let operation = validate(
            r#"
            query($withAuthor: Boolean!) {
               posts {
                    id @skip(if: true)
                    title @include(if: true)
                    author @include(if: $withAuthor) { id }
               }
            }
        "#,
            None,
            Some(json!({"withAuthor": false})),
            10,
        )
        .unwrap();

        assert_eq!(output_names(&operation.fields[0].subfields), vec!["title"]);
    }

    #[test]
    fn recursive_fragments() {
        let direct = validate(
            r#"
            query { posts { ...postFields } }
            fragment postFields on Post { ...postFields }
        "#,
            None,
            None,
            10,
        );
        assert!(matches!(direct, Err(ValidationError::FragmentCycle(..))));

        let through_nesting = validate(
            r#"
            query { posts { ...postInfo } }
            fragment postInfo on Post { author { ...authorInfo } }
            fragment authorInfo on User { posts { ...postInfo } }
        "#,
            None,
            None,
            usize::MAX,
        );
        assert!(matches!(
            through_nesting,
            Err(ValidationError::FragmentCycle(ref name, _)) if name == "postInfo"
        ));
    }

    #[test]
    fn fragment_on_the_wrong_type() {
        let result = validate(
            r#"
            query { posts { ...userFields } }
            fragment userFields on User { name }
        "#,
            None,
            None,
            10,
        );

        assert!(matches!(
            result,
            Err(ValidationError::FragmentTypeMismatch(..))
        ));
    }

    #[test]
    fn depth_counts_through_fragments() {
        let query = r#"
            query {
                posts { # 1
                    author { # 2
                        posts { # 3
                            ...authorPosts
                        }
                    }
                }
            }
            fragment authorPosts on Post {
                author { # 4
                    posts { # 5
                        id # 6
                    }
                }
            }
        "#;

        assert!(validate(query, None, None, 6).is_ok());
        assert!(matches!(
            validate(query, None, None, 5),
            Err(ValidationError::SelectionSetTooDeep(_))
        ));
    }

    #[test]
    fn operation_selection() {
        let query = r#"
            query firstPost { post(id: 1) { id } }
            query secondPost { post(id: 2) { id } }
        "#;

        let operation = validate(query, Some("secondPost"), None, 10).unwrap();
        assert_eq!(operation.name.as_deref(), Some("secondPost"));
        assert_eq!(operation.fields[0].arguments["id"], json!(2));

        assert!(matches!(
            validate(query, None, None, 10),
            Err(ValidationError::MultipleOperationsNoOperationName)
        ));
        assert!(matches!(
            validate(query, Some("thirdPost"), None, 10),
            Err(ValidationError::MultipleOperationsUnmatchedOperationName(_))
        ));

        let single = validate("query only { post(id: 1) { id } }", None, None, 10).unwrap();
        assert_eq!(single.name.as_deref(), Some("only"));
    }

    #[test]
    fn subscription_needs_exactly_one_root() {
        let operation = validate(
            r#"subscription { messageAdded(chatId: "123") { text } }"#,
            None,
            None,
            10,
        )
        .unwrap();
        assert_eq!(operation.typ, OperationType::Subscription);
        assert_eq!(operation.fields[0].arguments["chatId"], json!("123"));

        let result = validate(
            r#"subscription { messageAdded(chatId: "123") { text } postAdded { id } }"#,
            None,
            None,
            10,
        );
        assert!(matches!(
            result,
            Err(ValidationError::SubscriptionRootCount(2, _))
        ));
    }

    #[test]
    fn missing_root_type() {
        let result = validate("mutation { post(id: 1) { id } }", None, None, 10);

        assert!(matches!(
            result,
            Err(ValidationError::OperationNotFound(ref kind, _)) if kind == "mutation"
        ));
    }
}
