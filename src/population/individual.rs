//! Genetic-algorithm candidate.

use super::types::{Candidate, CandidateId, RequestContext, Species};
use crate::genome::Genes;
use crate::rpc::message::{EvaluationReply, EvaluationRequest, Mode};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A genome plus its lazily computed fitness.
///
/// Every operation that changes the genes clears the cached fitness, so a
/// cached value always belongs to the current genes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    id: CandidateId,
    genes: Genes,
    fitness: Option<f64>,
}

impl Individual {
    /// Creates an unevaluated individual.
    pub fn new(genes: Genes) -> Self {
        Self {
            id: 0,
            genes,
            fitness: None,
        }
    }

    /// Creates an individual with random genes.
    pub fn random<S: Species, R: Rng>(species: &S, rng: &mut R) -> Self {
        Self::new(species.create_genes(rng))
    }

    /// Creates an individual whose fitness is already known.
    pub fn evaluated(genes: Genes, fitness: f64) -> Self {
        Self {
            id: 0,
            genes,
            fitness: Some(fitness),
        }
    }

    /// Current genes.
    pub fn genes(&self) -> &Genes {
        &self.genes
    }

    /// Cached fitness, `None` until evaluated.
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// Replaces the genes and clears the cached fitness.
    pub fn set_genes(&mut self, genes: Genes) {
        self.genes = genes;
        self.fitness = None;
    }

    /// Mutates in place.
    pub fn mutate<S: Species, R: Rng>(&mut self, species: &S, rng: &mut R) {
        species.mutate(&mut self.genes, rng);
        self.fitness = None;
    }

    /// Crosses with `other`; both individuals receive recombined genes.
    pub fn crossover<S: Species, R: Rng>(&mut self, other: &mut Individual, species: &S, rng: &mut R) {
        species.crossover(&mut self.genes, &mut other.genes, rng);
        self.fitness = None;
        other.fitness = None;
    }

    /// Produces one unevaluated child with `other`.
    pub fn reproduce<S: Species, R: Rng>(&self, other: &Individual, species: &S, rng: &mut R) -> Individual {
        Individual::new(species.reproduce(&self.genes, &other.genes, rng))
    }
}

impl Candidate for Individual {
    const MODE: Mode = Mode::Genetic;

    fn id(&self) -> CandidateId {
        self.id
    }

    fn set_id(&mut self, id: CandidateId) {
        self.id = id;
    }

    fn score(&self) -> Option<f64> {
        self.fitness
    }

    fn needs_evaluation(&self) -> bool {
        self.fitness.is_none()
    }

    fn to_request(&self, generation: u64, context: &RequestContext<'_>) -> EvaluationRequest {
        EvaluationRequest::genetic(self.id, self.genes.clone())
            .with_generation(generation)
            .with_context(context)
    }

    fn absorb(&mut self, reply: EvaluationReply) -> Result<(), String> {
        match reply {
            EvaluationReply::Genetic { fitness, .. } => {
                self.fitness = Some(fitness);
                Ok(())
            }
            other => Err(format!(
                "expected a genetic reply for individual {}, got {}",
                self.id,
                other.kind()
            )),
        }
    }

    fn penalize(&mut self, worst: f64) {
        self.fitness = Some(worst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::create_rng;
    use crate::testing::{onemax_species, value_genes};

    #[test]
    fn test_mutation_clears_fitness() {
        let species = onemax_species(8);
        let mut rng = create_rng(42);
        let mut ind = Individual::evaluated(species.create_genes(&mut rng), 3.0);
        ind.mutate(&species, &mut rng);
        assert_eq!(ind.fitness(), None);
    }

    #[test]
    fn test_crossover_clears_both() {
        let species = onemax_species(8);
        let mut rng = create_rng(42);
        let mut a = Individual::evaluated(species.create_genes(&mut rng), 1.0);
        let mut b = Individual::evaluated(species.create_genes(&mut rng), 2.0);
        a.crossover(&mut b, &species, &mut rng);
        assert!(a.needs_evaluation());
        assert!(b.needs_evaluation());
    }

    #[test]
    fn test_set_genes_clears_fitness() {
        let mut ind = Individual::evaluated(value_genes(0.5), 0.5);
        ind.set_genes(value_genes(0.7));
        assert_eq!(ind.fitness(), None);
        assert_eq!(ind.genes(), &value_genes(0.7));
    }

    #[test]
    fn test_reproduce_child_is_unevaluated() {
        let species = onemax_species(8);
        let mut rng = create_rng(1);
        let a = Individual::evaluated(species.create_genes(&mut rng), 1.0);
        let b = Individual::evaluated(species.create_genes(&mut rng), 2.0);
        let child = a.reproduce(&b, &species, &mut rng);
        assert!(child.needs_evaluation());
    }

    #[test]
    fn test_absorb_rejects_swarm_reply() {
        let mut ind = Individual::new(value_genes(0.1));
        let reply = EvaluationReply::Failed {
            id: Some(0),
            reason: "boom".into(),
        };
        assert!(ind.absorb(reply).is_err());
        assert!(ind.needs_evaluation());

        ind.absorb(EvaluationReply::Genetic { id: 0, fitness: 0.4 }).unwrap();
        assert_eq!(ind.fitness(), Some(0.4));
    }
}
